use std::time::Duration;

use serde::Deserialize;

use crate::builders::{default_name, validation_result};
use crate::error::PackstepError;

/// vSphere clone builder configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VsphereConfig {
    pub vcenter_server: String,
    /// Falls back to `VSPHERE_USER`.
    #[serde(default)]
    pub username: String,
    /// Falls back to `VSPHERE_PASSWORD`.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub insecure_connection: bool,
    #[serde(default)]
    pub datacenter: Option<String>,

    /// VM or template to clone.
    pub template: String,
    #[serde(default)]
    pub vm_name: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub resource_pool: Option<String>,
    #[serde(default)]
    pub datastore: Option<String>,
    #[serde(default)]
    pub linked_clone: bool,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Grows the primary disk of the clone.
    #[serde(default)]
    pub disk_size_mb: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub ram_mb: Option<u64>,

    #[serde(default = "default_ip_wait_timeout_secs")]
    pub ip_wait_timeout_secs: u64,
    #[serde(default)]
    pub shutdown_command: Option<String>,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub create_snapshot: bool,
    #[serde(default = "default_snapshot_name")]
    pub snapshot_name: String,
    #[serde(default)]
    pub convert_to_template: bool,
}

fn default_ip_wait_timeout_secs() -> u64 {
    30 * 60
}

fn default_shutdown_timeout_secs() -> u64 {
    5 * 60
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_snapshot_name() -> String {
    "Created By Packer".to_string()
}

impl VsphereConfig {
    pub fn new(vcenter_server: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            vcenter_server: vcenter_server.into(),
            username: String::new(),
            password: String::new(),
            insecure_connection: false,
            datacenter: None,
            template: template.into(),
            vm_name: String::new(),
            folder: None,
            cluster: None,
            host: None,
            resource_pool: None,
            datastore: None,
            linked_clone: false,
            network: None,
            mac_address: None,
            disk_size_mb: None,
            notes: None,
            cpus: None,
            ram_mb: None,
            ip_wait_timeout_secs: default_ip_wait_timeout_secs(),
            shutdown_command: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            create_snapshot: false,
            snapshot_name: default_snapshot_name(),
            convert_to_template: false,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ip_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_wait_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Whether the clone needs a reconfiguration after cloning.
    pub fn has_hardware(&self) -> bool {
        self.cpus.is_some() || self.ram_mb.is_some()
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.username.is_empty() {
            self.username = std::env::var("VSPHERE_USER").unwrap_or_default();
        }
        if self.password.is_empty() {
            self.password = std::env::var("VSPHERE_PASSWORD").unwrap_or_default();
        }
        if self.vcenter_server.trim().is_empty() {
            errors.push("'vcenter_server' is required".to_string());
        }
        if self.username.is_empty() {
            errors.push("'username' is required (or set VSPHERE_USER)".to_string());
        }
        if self.template.trim().is_empty() {
            errors.push("'template' is required".to_string());
        }
        if self.linked_clone && self.disk_size_mb.is_some() {
            errors.push("'linked_clone' and 'disk_size_mb' cannot be used together".to_string());
        }
        if self.mac_address.is_some() && self.network.is_none() {
            errors.push("'network' is required when 'mac_address' is specified".to_string());
        }
        if self.cpus == Some(0) {
            errors.push("'cpus' must be at least 1".to_string());
        }
        if self.ram_mb == Some(0) {
            errors.push("'ram_mb' must be at least 1".to_string());
        }
        if self.poll_interval_secs == 0 {
            errors.push("'poll_interval_secs' must be at least 1".to_string());
        }
        if self.create_snapshot && self.snapshot_name.trim().is_empty() {
            errors.push("'snapshot_name' is required when 'create_snapshot' is set".to_string());
        }
        if self.insecure_connection {
            warnings.push("TLS certificate verification is disabled".to_string());
        }

        validation_result(errors)?;

        default_name(&mut self.vm_name, "packer");
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> VsphereConfig {
        let mut config = VsphereConfig::new("vcenter.example.com", "ubuntu-template");
        config.username = "admin".to_string();
        config
    }

    #[test]
    fn test_prepare_requires_template() {
        let mut config = valid();
        config.template = String::new();
        assert!(config.prepare().unwrap_err().to_string().contains("'template' is required"));
    }

    #[test]
    fn test_prepare_rejects_linked_clone_with_disk_size() {
        let mut config = valid();
        config.linked_clone = true;
        config.disk_size_mb = Some(32768);
        let message = config.prepare().unwrap_err().to_string();
        assert!(message.contains("cannot be used together"));
    }

    #[test]
    fn test_prepare_requires_network_for_mac_address() {
        let mut config = valid();
        config.mac_address = Some("00:50:56:00:00:01".to_string());
        let message = config.prepare().unwrap_err().to_string();
        assert!(message.contains("'network' is required"));
    }

    #[test]
    fn test_prepare_fills_vm_name() {
        let mut config = valid();
        config.prepare().unwrap();
        assert!(config.vm_name.starts_with("packer-"));
        assert!(!config.has_hardware());
    }
}
