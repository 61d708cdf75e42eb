use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::builders::{unique_name, validation_result};
use crate::error::PackstepError;

const OMI_NAME_PATTERN: &str = r"^[\w()\[\] ./\-'@]{3,128}$";

/// Selects the newest OMI matching a name, optionally restricted to owners.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OmiFilter {
    pub name: String,
    #[serde(default)]
    pub owners: Vec<String>,
}

/// A volume attached at launch.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlockDevice {
    pub device_name: String,
    #[serde(default)]
    pub volume_size: Option<u32>,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default = "default_true")]
    pub delete_on_vm_deletion: bool,
}

/// The launch device that becomes the root device of the registered OMI.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RootDevice {
    pub source_device_name: String,
    #[serde(default = "default_root_device_name")]
    pub device_name: String,
}

/// Outscale BSU builder configuration, shared by `osc-bsu` and
/// `osc-bsusurrogate`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OscConfig {
    /// Falls back to `OUTSCALE_ACCESSKEYID`.
    #[serde(default)]
    pub access_key: String,
    /// Falls back to `OUTSCALE_SECRETKEYID`.
    #[serde(default)]
    pub secret_key: String,
    /// Falls back to `OUTSCALE_REGION`.
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub source_omi: Option<String>,
    #[serde(default)]
    pub source_omi_filter: Option<OmiFilter>,
    pub vm_type: String,
    #[serde(default)]
    pub subregion_name: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub launch_block_device_mappings: Vec<BlockDevice>,
    #[serde(default)]
    pub root_device: Option<RootDevice>,

    /// Existing key pair; a temporary one is created when absent.
    #[serde(default)]
    pub ssh_keypair_name: Option<String>,
    #[serde(default)]
    pub temporary_key_pair_name: String,
    /// Existing security groups; a temporary one is created when empty.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default = "default_source_cidr")]
    pub temporary_security_group_source_cidr: String,
    #[serde(default)]
    pub disable_stop_vm: bool,

    pub omi_name: String,
    #[serde(default)]
    pub omi_description: Option<String>,
    #[serde(default)]
    pub omi_account_ids: Vec<String>,
    #[serde(default)]
    pub omi_groups: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub snapshot_tags: BTreeMap<String, String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_state_timeout_secs")]
    pub state_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_root_device_name() -> String {
    "/dev/sda1".to_string()
}

fn default_source_cidr() -> String {
    "0.0.0.0/0".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_state_timeout_secs() -> u64 {
    600
}

fn env_fallback(field: &mut String, var: &str) {
    if field.is_empty() {
        *field = std::env::var(var).unwrap_or_default();
    }
}

fn check_omi_name(name: &str, errors: &mut Vec<String>) -> Result<(), PackstepError> {
    let pattern = Regex::new(OMI_NAME_PATTERN)
        .map_err(|e| PackstepError::Config(format!("invalid omi name pattern: {}", e)))?;
    if !pattern.is_match(name) {
        errors.push(format!(
            "omi_name '{}' must be 3-128 characters of letters, numbers, spaces and ()[]./-'@_",
            name
        ));
    }
    Ok(())
}

impl OscConfig {
    pub fn new(
        source_omi: impl Into<String>,
        vm_type: impl Into<String>,
        omi_name: impl Into<String>,
    ) -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            region: String::new(),
            source_omi: Some(source_omi.into()),
            source_omi_filter: None,
            vm_type: vm_type.into(),
            subregion_name: None,
            subnet_id: None,
            user_data: None,
            launch_block_device_mappings: Vec::new(),
            root_device: None,
            ssh_keypair_name: None,
            temporary_key_pair_name: String::new(),
            security_group_ids: Vec::new(),
            temporary_security_group_source_cidr: default_source_cidr(),
            disable_stop_vm: false,
            omi_name: omi_name.into(),
            omi_description: None,
            omi_account_ids: Vec::new(),
            omi_groups: Vec::new(),
            tags: BTreeMap::new(),
            snapshot_tags: BTreeMap::new(),
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

    /// Prepares the configuration for the `osc-bsu` builder.
    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let (errors, warnings) = self.check()?;
        validation_result(errors)?;
        self.fill_defaults();
        Ok(warnings)
    }

    /// Prepares the configuration for the `osc-bsusurrogate` builder, which
    /// additionally needs the launch devices and the root device.
    pub fn prepare_surrogate(&mut self) -> Result<Vec<String>, PackstepError> {
        let (mut errors, warnings) = self.check()?;
        match &self.root_device {
            None => errors.push("root_device is required".to_string()),
            Some(root) => {
                let launched = self
                    .launch_block_device_mappings
                    .iter()
                    .any(|device| device.device_name == root.source_device_name);
                if !launched {
                    errors.push(format!(
                        "root_device.source_device_name {} is not in launch_block_device_mappings",
                        root.source_device_name
                    ));
                }
            }
        }
        validation_result(errors)?;
        self.fill_defaults();
        Ok(warnings)
    }

    fn check(&mut self) -> Result<(Vec<String>, Vec<String>), PackstepError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        env_fallback(&mut self.access_key, "OUTSCALE_ACCESSKEYID");
        env_fallback(&mut self.secret_key, "OUTSCALE_SECRETKEYID");
        env_fallback(&mut self.region, "OUTSCALE_REGION");
        for (field, value) in [
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("region", &self.region),
            ("vm_type", &self.vm_type),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} is required", field));
            }
        }
        match (&self.source_omi, &self.source_omi_filter) {
            (None, None) => errors.push("source_omi or source_omi_filter is required".to_string()),
            (Some(_), Some(_)) => {
                errors.push("only one of source_omi and source_omi_filter may be set".to_string())
            }
            _ => {}
        }
        check_omi_name(&self.omi_name, &mut errors)?;
        for device in &self.launch_block_device_mappings {
            if device.device_name.trim().is_empty() {
                errors.push("launch_block_device_mappings entries need a device_name".to_string());
            }
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be at least 1".to_string());
        }
        if self.state_timeout_secs == 0 {
            errors.push("state_timeout_secs must be at least 1".to_string());
        }
        if self.security_group_ids.is_empty()
            && self.temporary_security_group_source_cidr == default_source_cidr()
        {
            warnings.push(
                "the temporary security group will accept SSH from 0.0.0.0/0".to_string(),
            );
        }
        Ok((errors, warnings))
    }

    fn fill_defaults(&mut self) {
        if self.temporary_key_pair_name.trim().is_empty() {
            self.temporary_key_pair_name = unique_name("packer");
        }
    }
}
