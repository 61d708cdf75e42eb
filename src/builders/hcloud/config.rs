use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Deserialize;
use url::Url;

use crate::builders::{default_name, validation_result};
use crate::error::PackstepError;

/// Rescue systems the Hetzner Cloud API can boot.
const RESCUE_TYPES: [&str; 3] = ["linux64", "linux32", "freebsd64"];

/// Hetzner Cloud builder configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HcloudConfig {
    /// API token; falls back to `HCLOUD_TOKEN` when empty.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub location: Option<String>,
    pub server_type: String,
    pub image: String,
    #[serde(default)]
    pub user_data: Option<String>,
    /// Existing SSH key names or IDs to add to the server.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Public key uploaded as a temporary key for this build.
    #[serde(default)]
    pub ssh_public_key_file: Option<Utf8PathBuf>,
    /// Boots the server into this rescue system before provisioning.
    #[serde(default)]
    pub rescue: Option<String>,

    #[serde(default)]
    pub snapshot_name: String,
    #[serde(default)]
    pub snapshot_labels: BTreeMap<String, String>,

    #[serde(default = "default_state_timeout_secs")]
    pub state_timeout_secs: u64,

    /// Contents of `ssh_public_key_file`, read by `prepare`.
    #[serde(skip)]
    pub ssh_public_key: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.hetzner.cloud/v1".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_state_timeout_secs() -> u64 {
    600
}

impl HcloudConfig {
    pub fn new(server_type: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            token: String::new(),
            endpoint: default_endpoint(),
            poll_interval_secs: default_poll_interval_secs(),
            server_name: String::new(),
            location: None,
            server_type: server_type.into(),
            image: image.into(),
            user_data: None,
            ssh_keys: Vec::new(),
            ssh_public_key_file: None,
            rescue: None,
            snapshot_name: String::new(),
            snapshot_labels: BTreeMap::new(),
            state_timeout_secs: default_state_timeout_secs(),
            ssh_public_key: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_secs(self.state_timeout_secs)
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.token.is_empty() {
            self.token = std::env::var("HCLOUD_TOKEN").unwrap_or_default();
        }
        if self.token.is_empty() {
            errors.push("token is required (or set HCLOUD_TOKEN)".to_string());
        }
        match Url::parse(&self.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!("endpoint has unsupported scheme '{}'", url.scheme())),
            Err(e) => errors.push(format!("endpoint is not a valid URL: {}", e)),
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be at least 1".to_string());
        }
        if self.state_timeout_secs == 0 {
            errors.push("state_timeout_secs must be at least 1".to_string());
        }
        if self.server_type.trim().is_empty() {
            errors.push("server_type is required".to_string());
        }
        if self.image.trim().is_empty() {
            errors.push("image is required".to_string());
        }
        if let Some(rescue) = &self.rescue {
            if !RESCUE_TYPES.contains(&rescue.as_str()) {
                errors.push(format!(
                    "rescue must be one of {}, got '{}'",
                    RESCUE_TYPES.join(", "),
                    rescue
                ));
            }
        }
        if let Some(path) = &self.ssh_public_key_file {
            match fs::read_to_string(path) {
                Ok(key) if !key.trim().is_empty() => {
                    self.ssh_public_key = Some(key.trim().to_string());
                }
                Ok(_) => errors.push(format!("ssh_public_key_file {} is empty", path)),
                Err(e) => errors.push(format!(
                    "failed to read ssh_public_key_file {}: {}",
                    path,
                    crate::error::io_error_kind_message(&e)
                )),
            }
        } else if self.ssh_keys.is_empty() {
            warnings.push(
                "neither ssh_keys nor ssh_public_key_file is set; the server will have no SSH key"
                    .to_string(),
            );
        }
        if self.location.is_none() {
            warnings.push("no location set; the provider picks one".to_string());
        }

        validation_result(errors)?;

        default_name(&mut self.server_name, "packer");
        default_name(&mut self.snapshot_name, "packer");
        Ok(warnings)
    }
}
