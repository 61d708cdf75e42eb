//! Communicator configuration.

use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Deserialize;

use crate::error::PackstepError;

/// How the build reaches the machine. The `type` field selects the variant.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommunicatorConfig {
    /// No communicator: connect and provisioning are skipped.
    #[default]
    None,
    /// SSH communicator.
    Ssh(SshConfig),
}

impl CommunicatorConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ssh(_) => "ssh",
        }
    }

    /// Port firewall rules must open; SSH's default when there is no communicator.
    pub fn port(&self) -> u16 {
        match self {
            Self::None => default_port(),
            Self::Ssh(ssh) => ssh.port,
        }
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::Ssh(ssh) => ssh.prepare(),
        }
    }
}

/// SSH connection settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overrides the address discovered from the created machine.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<Utf8PathBuf>,
    /// Total time to wait for the machine to accept a connection.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay between connection attempts.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_interval_secs() -> u64 {
    5
}

impl SshConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            port: default_port(),
            host: None,
            private_key_file: None,
            timeout_secs: default_timeout_secs(),
            interval_secs: default_interval_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut errors = Vec::new();
        if self.username.trim().is_empty() {
            errors.push("ssh username must not be empty".to_string());
        }
        if self.port == 0 {
            errors.push("ssh port must not be 0".to_string());
        }
        if self.interval_secs == 0 {
            errors.push("ssh interval_secs must be at least 1".to_string());
        }
        if !errors.is_empty() {
            return Err(PackstepError::Validation(errors.join("; ")));
        }

        let mut warnings = Vec::new();
        if self.private_key_file.is_none() {
            warnings.push(
                "no ssh private_key_file set; the connector must authenticate on its own"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}
