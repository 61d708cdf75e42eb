//! The Hyper-V host operations used by the builder.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

/// What to clone and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub vmcx_path: Option<Utf8PathBuf>,
    pub source_vm: Option<String>,
    pub snapshot_name: Option<String>,
    pub all_snapshots: bool,
    pub vm_name: String,
    /// Directory receiving the clone's configuration and disks.
    pub path: Utf8PathBuf,
    pub switch_name: String,
    pub memory_mb: u64,
}

/// Hyper-V host driver.
pub trait Driver: Send + Sync {
    /// Checks that the host can run Hyper-V builds.
    fn verify(&self) -> Result<()>;

    fn clone_vm(&self, request: &CloneRequest) -> Result<()>;
    fn delete_vm(&self, vm: &str) -> Result<()>;

    fn set_cpu_count(&self, vm: &str, cpus: u32) -> Result<()>;
    fn set_mac_spoofing(&self, vm: &str, enable: bool) -> Result<()>;
    fn set_dynamic_memory(&self, vm: &str, enable: bool) -> Result<()>;
    fn set_secure_boot(&self, vm: &str, enable: bool) -> Result<()>;
    fn set_virtualization_extensions(&self, vm: &str, enable: bool) -> Result<()>;
    fn enable_integration_service(&self, vm: &str, service: &str) -> Result<()>;
    fn set_vlan_id(&self, vm: &str, vlan_id: u16) -> Result<()>;

    fn start(&self, vm: &str) -> Result<()>;
    fn stop(&self, vm: &str) -> Result<()>;
    fn is_running(&self, vm: &str) -> Result<bool>;
    fn is_off(&self, vm: &str) -> Result<bool>;
    fn mac(&self, vm: &str) -> Result<String>;
    fn ip_address(&self, mac: &str) -> Result<String>;

    fn compact_disks(&self, disk_dir: &Utf8Path) -> Result<()>;
    fn export_vm(&self, vm: &str, path: &Utf8Path) -> Result<()>;
    fn copy_exported_vm(&self, export_path: &Utf8Path, output_path: &Utf8Path) -> Result<()>;
}
