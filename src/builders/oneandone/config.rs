use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Deserialize;
use url::Url;

use crate::builders::{default_name, validation_result};
use crate::error::PackstepError;

/// 1&1 Cloud Server builder configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OneandoneConfig {
    /// API token; falls back to `ONEANDONE_TOKEN` when empty.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_url")]
    pub url: String,

    /// Name of the server appliance the build server boots from.
    pub source_image_name: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub data_center_name: Option<String>,
    #[serde(default = "default_disk_size")]
    pub disk_size: u32,
    /// Public key installed for the build user.
    #[serde(default)]
    pub ssh_public_key_file: Option<Utf8PathBuf>,

    /// Name of the resulting image.
    #[serde(default)]
    pub image_name: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_state_timeout_secs")]
    pub state_timeout_secs: u64,
}

fn default_url() -> String {
    "https://cloudpanel-api.1and1.com/v1".to_string()
}

fn default_disk_size() -> u32 {
    50
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_state_timeout_secs() -> u64 {
    600
}

impl OneandoneConfig {
    pub fn new(source_image_name: impl Into<String>) -> Self {
        Self {
            token: String::new(),
            url: default_url(),
            source_image_name: source_image_name.into(),
            server_name: String::new(),
            data_center_name: None,
            disk_size: default_disk_size(),
            ssh_public_key_file: None,
            image_name: String::new(),
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

        if self.token.is_empty() {
            self.token = std::env::var("ONEANDONE_TOKEN").unwrap_or_default();
        }
        if self.token.is_empty() {
            errors.push("token is required (or set ONEANDONE_TOKEN)".to_string());
        }
        if let Err(e) = Url::parse(&self.url) {
            errors.push(format!("url is not a valid URL: {}", e));
        }
        if self.source_image_name.trim().is_empty() {
            errors.push("source_image_name is required".to_string());
        }
        if self.disk_size == 0 {
            errors.push("disk_size must be at least 1".to_string());
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be at least 1".to_string());
        }
        if self.state_timeout_secs == 0 {
            errors.push("state_timeout_secs must be at least 1".to_string());
        }
        match &self.ssh_public_key_file {
            Some(path) if !path.is_file() => {
                errors.push(format!("ssh_public_key_file {} does not exist", path));
            }
            Some(_) => {}
            None => warnings.push(
                "no ssh_public_key_file set; the server will only accept password logins"
                    .to_string(),
            ),
        }

        validation_result(errors)?;

        default_name(&mut self.server_name, "packer");
        default_name(&mut self.image_name, "packer");
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_generates_names_and_warns_without_key() {
        let mut config = OneandoneConfig::new("ubuntu1604-64std");
        config.token = "secret".to_string();
        let warnings = config.prepare().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(config.server_name.starts_with("packer-"));
        assert!(config.image_name.starts_with("packer-"));
    }

    #[test]
    fn test_prepare_rejects_missing_key_file() {
        let mut config = OneandoneConfig::new("ubuntu1604-64std");
        config.token = "secret".to_string();
        config.ssh_public_key_file = Some(Utf8PathBuf::from("/nonexistent/id.pub"));
        let message = config.prepare().unwrap_err().to_string();
        assert!(message.contains("ssh_public_key_file"));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let yaml = "token: t\nsource_image_name: centos7-64std\n";
        let config: OneandoneConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.disk_size, 50);
        assert_eq!(config.url, "https://cloudpanel-api.1and1.com/v1");
        assert_eq!(config.state_timeout(), Duration::from_secs(600));
    }
}
