use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::builders::{default_name, validation_result};
use crate::error::PackstepError;

/// Triton (Joyent) builder configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TritonConfig {
    #[serde(default = "default_url")]
    pub triton_url: String,
    /// Falls back to `TRITON_ACCOUNT`.
    #[serde(default)]
    pub triton_account: String,
    /// Falls back to `TRITON_KEY_ID`.
    #[serde(default)]
    pub triton_key_id: String,

    #[serde(default)]
    pub source_machine_name: String,
    pub source_machine_package: String,
    pub source_machine_image: String,
    #[serde(default)]
    pub source_machine_networks: Vec<String>,
    #[serde(default)]
    pub source_machine_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub source_machine_tags: BTreeMap<String, String>,

    pub image_name: String,
    pub image_version: String,
    #[serde(default)]
    pub image_description: Option<String>,
    #[serde(default)]
    pub image_tags: BTreeMap<String, String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_state_timeout_secs")]
    pub state_timeout_secs: u64,
}

fn default_url() -> String {
    "https://us-east-1.api.joyent.com".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_state_timeout_secs() -> u64 {
    600
}

fn env_fallback(field: &mut String, var: &str) {
    if field.is_empty() {
        *field = std::env::var(var).unwrap_or_default();
    }
}

impl TritonConfig {
    pub fn new(
        package: impl Into<String>,
        image: impl Into<String>,
        image_name: impl Into<String>,
        image_version: impl Into<String>,
    ) -> Self {
        Self {
            triton_url: default_url(),
            triton_account: String::new(),
            triton_key_id: String::new(),
            source_machine_name: String::new(),
            source_machine_package: package.into(),
            source_machine_image: image.into(),
            source_machine_networks: Vec::new(),
            source_machine_metadata: BTreeMap::new(),
            source_machine_tags: BTreeMap::new(),
            image_name: image_name.into(),
            image_version: image_version.into(),
            image_description: None,
            image_tags: BTreeMap::new(),
            poll_interval_secs: default_poll_interval_secs(),
            state_timeout_secs: default_state_timeout_secs(),
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

        env_fallback(&mut self.triton_account, "TRITON_ACCOUNT");
        env_fallback(&mut self.triton_key_id, "TRITON_KEY_ID");

        if let Err(e) = Url::parse(&self.triton_url) {
            errors.push(format!("triton_url is not a valid URL: {}", e));
        }
        if self.triton_account.is_empty() {
            errors.push("triton_account is required (or set TRITON_ACCOUNT)".to_string());
        }
        if self.triton_key_id.is_empty() {
            errors.push("triton_key_id is required (or set TRITON_KEY_ID)".to_string());
        }
        for (field, value) in [
            ("source_machine_package", &self.source_machine_package),
            ("source_machine_image", &self.source_machine_image),
            ("image_name", &self.image_name),
            ("image_version", &self.image_version),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} is required", field));
            }
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be at least 1".to_string());
        }
        if self.state_timeout_secs == 0 {
            errors.push("state_timeout_secs must be at least 1".to_string());
        }
        if self.source_machine_networks.is_empty() {
            warnings.push("no source_machine_networks set; the package default is used".to_string());
        }

        validation_result(errors)?;

        default_name(&mut self.source_machine_name, "packer-builder");
        Ok(warnings)
    }
}
