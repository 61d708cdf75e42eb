//! The vCenter operations used by the clone builder.

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSpec {
    pub template: String,
    pub name: String,
    pub folder: Option<String>,
    pub cluster: Option<String>,
    pub host: Option<String>,
    pub resource_pool: Option<String>,
    pub datastore: Option<String>,
    pub linked_clone: bool,
    pub network: Option<String>,
    pub mac_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSpec {
    pub cpus: Option<u32>,
    pub ram_mb: Option<u64>,
}

/// vCenter driver. VMs are addressed by the reference `clone_vm` returns.
pub trait VsphereDriver: Send + Sync {
    fn clone_vm(&self, spec: &CloneSpec) -> Result<String>;
    fn resize_disk(&self, vm: &str, size_mb: u64) -> Result<()>;
    fn configure(&self, vm: &str, hardware: &HardwareSpec) -> Result<()>;
    fn destroy(&self, vm: &str) -> Result<()>;

    fn power_on(&self, vm: &str) -> Result<()>;
    fn power_off(&self, vm: &str) -> Result<()>;
    fn is_powered_on(&self, vm: &str) -> Result<bool>;
    /// Asks the guest tools to shut the guest down.
    fn shutdown_guest(&self, vm: &str) -> Result<()>;
    /// The guest's IP address once the tools report one.
    fn guest_ip(&self, vm: &str) -> Result<Option<String>>;

    fn create_snapshot(&self, vm: &str, name: &str) -> Result<()>;
    fn convert_to_template(&self, vm: &str) -> Result<()>;
}
