use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Deserialize;

use crate::builders::{default_name, validation_result};
use crate::error::PackstepError;

/// Largest VLAN ID accepted by Hyper-V.
const MAX_VLAN_ID: u16 = 4094;
const MIN_MEMORY_MB: u64 = 32;
/// 12 TB, the most a Hyper-V guest can be given.
const MAX_MEMORY_MB: u64 = 12 * 1024 * 1024;

/// Hyper-V builder configuration for cloning an existing VM (vmcx).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HypervConfig {
    /// Exported VM directory to import from.
    #[serde(default)]
    pub clone_from_vmcx_path: Option<Utf8PathBuf>,
    /// Registered VM to clone from.
    #[serde(default)]
    pub clone_from_vm_name: Option<String>,
    #[serde(default)]
    pub clone_from_snapshot_name: Option<String>,
    #[serde(default)]
    pub clone_all_snapshots: bool,

    #[serde(default)]
    pub vm_name: String,
    #[serde(default = "default_switch_name")]
    pub switch_name: String,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default)]
    pub enable_mac_spoofing: bool,
    #[serde(default)]
    pub enable_dynamic_memory: bool,
    #[serde(default)]
    pub enable_secure_boot: bool,
    #[serde(default)]
    pub enable_virtualization_extensions: bool,
    /// Enables the "Guest Service Interface" integration service.
    #[serde(default)]
    pub guest_services: bool,
    #[serde(default)]
    pub vlan_id: Option<u16>,

    /// Command run over the communicator to stop the VM; falls back to a
    /// hard stop when unset or without a session.
    #[serde(default)]
    pub shutdown_command: Option<String>,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub output_dir: Utf8PathBuf,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub temp_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub keep_registered: bool,
    #[serde(default)]
    pub skip_compaction: bool,
    #[serde(default)]
    pub skip_export: bool,

    #[serde(default = "default_powershell")]
    pub powershell: String,
}

fn default_switch_name() -> String {
    "Default Switch".to_string()
}

fn default_cpus() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    1024
}

fn default_shutdown_timeout_secs() -> u64 {
    300
}

fn default_powershell() -> String {
    "powershell.exe".to_string()
}

impl HypervConfig {
    pub fn from_vm(name: impl Into<String>) -> Self {
        Self {
            clone_from_vmcx_path: None,
            clone_from_vm_name: Some(name.into()),
            clone_from_snapshot_name: None,
            clone_all_snapshots: false,
            vm_name: String::new(),
            switch_name: default_switch_name(),
            cpus: default_cpus(),
            memory_mb: default_memory_mb(),
            enable_mac_spoofing: false,
            enable_dynamic_memory: false,
            enable_secure_boot: false,
            enable_virtualization_extensions: false,
            guest_services: false,
            vlan_id: None,
            shutdown_command: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            output_dir: Utf8PathBuf::new(),
            force: false,
            temp_path: None,
            keep_registered: false,
            skip_compaction: false,
            skip_export: false,
            powershell: default_powershell(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match (&self.clone_from_vmcx_path, &self.clone_from_vm_name) {
            (None, None) => errors
                .push("one of clone_from_vmcx_path or clone_from_vm_name is required".to_string()),
            (Some(_), Some(_)) => errors.push(
                "clone_from_vmcx_path and clone_from_vm_name are mutually exclusive".to_string(),
            ),
            (Some(path), None) if !path.is_dir() => errors.push(format!(
                "clone_from_vmcx_path {} does not exist or is not a directory",
                path
            )),
            _ => {}
        }
        if self.clone_from_snapshot_name.is_some() && self.clone_all_snapshots {
            errors.push(
                "clone_from_snapshot_name and clone_all_snapshots are mutually exclusive"
                    .to_string(),
            );
        }
        if self.cpus == 0 {
            errors.push("cpus must be at least 1".to_string());
        }
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&self.memory_mb) {
            errors.push(format!(
                "memory_mb must be between {} and {}",
                MIN_MEMORY_MB, MAX_MEMORY_MB
            ));
        }
        if let Some(vlan) = self.vlan_id {
            if vlan == 0 || vlan > MAX_VLAN_ID {
                errors.push(format!("vlan_id must be between 1 and {}", MAX_VLAN_ID));
            }
        }
        if self.switch_name.trim().is_empty() {
            errors.push("switch_name must not be empty".to_string());
        }
        if self.shutdown_timeout_secs == 0 {
            errors.push("shutdown_timeout_secs must be at least 1".to_string());
        }
        if self.enable_dynamic_memory && self.enable_virtualization_extensions {
            warnings.push(
                "dynamic memory and virtualization extensions rarely work together".to_string(),
            );
        }
        if self.skip_export && !self.keep_registered {
            warnings.push(
                "skip_export without keep_registered discards the VM at the end of the build"
                    .to_string(),
            );
        }

        validation_result(errors)?;

        default_name(&mut self.vm_name, "packer");
        if self.output_dir.as_str().is_empty() {
            self.output_dir = Utf8PathBuf::from(format!("output-{}", self.vm_name));
        }
        Ok(warnings)
    }
}
