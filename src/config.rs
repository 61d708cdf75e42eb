//! YAML build profiles.

use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use serde::Deserialize;

use crate::builders::hcloud::{self, HcloudConfig};
use crate::builders::hyperv::{self, HypervConfig};
use crate::builders::oneandone::{self, OneandoneConfig};
use crate::builders::osc::{self, OscConfig, OscFlavor};
use crate::builders::triton::{self, TritonConfig};
use crate::builders::vsphere::{self, VsphereConfig};
use crate::communicator::CommunicatorConfig;
use crate::error::PackstepError;
use crate::multistep::{Runner, Step};
use crate::provisioners::ProvisionerConfig;

/// A complete build description.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub builder: BuilderConfig,
    #[serde(default)]
    pub communicator: CommunicatorConfig,
    #[serde(default)]
    pub provisioners: Vec<ProvisionerConfig>,
}

/// Provider configuration. The `type` field selects the builder.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuilderConfig {
    Hcloud(HcloudConfig),
    #[serde(rename = "hyperv-vmcx")]
    HypervVmcx(HypervConfig),
    Oneandone(OneandoneConfig),
    #[serde(rename = "osc-bsu")]
    OscBsu(OscConfig),
    #[serde(rename = "osc-bsusurrogate")]
    OscBsuSurrogate(OscConfig),
    Triton(TritonConfig),
    #[serde(rename = "vsphere-clone")]
    VsphereClone(VsphereConfig),
}

impl BuilderConfig {
    /// The builder type as written in profiles.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hcloud(_) => "hcloud",
            Self::HypervVmcx(_) => "hyperv-vmcx",
            Self::Oneandone(_) => "oneandone",
            Self::OscBsu(_) => "osc-bsu",
            Self::OscBsuSurrogate(_) => "osc-bsusurrogate",
            Self::Triton(_) => "triton",
            Self::VsphereClone(_) => "vsphere-clone",
        }
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        match self {
            Self::Hcloud(config) => config.prepare(),
            Self::HypervVmcx(config) => config.prepare(),
            Self::Oneandone(config) => config.prepare(),
            Self::OscBsu(config) => config.prepare(),
            Self::OscBsuSurrogate(config) => config.prepare_surrogate(),
            Self::Triton(config) => config.prepare(),
            Self::VsphereClone(config) => config.prepare(),
        }
    }

    /// The steps this builder would run with `communicator`.
    pub fn steps(&self, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
        match self {
            Self::Hcloud(config) => hcloud::steps(config, communicator),
            Self::HypervVmcx(config) => hyperv::steps(config, communicator),
            Self::Oneandone(config) => oneandone::steps(config, communicator),
            Self::OscBsu(config) => osc::steps(OscFlavor::Bsu, config, communicator),
            Self::OscBsuSurrogate(config) => {
                osc::steps(OscFlavor::BsuSurrogate, config, communicator)
            }
            Self::Triton(config) => triton::steps(config, communicator),
            Self::VsphereClone(config) => vsphere::steps(config, communicator),
        }
    }
}

impl Profile {
    /// Validates the whole profile and fills derived defaults.
    ///
    /// Returns the warnings of the builder, the communicator and the
    /// provisioners, in that order.
    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut warnings = self.builder.prepare()?;
        warnings.extend(self.communicator.prepare()?);
        for provisioner in &self.provisioners {
            provisioner.validate()?;
        }
        if !self.provisioners.is_empty() && self.communicator == CommunicatorConfig::None {
            return Err(PackstepError::Validation(
                "provisioners require a communicator, but communicator type is none".to_string(),
            ));
        }
        Ok(warnings)
    }

    /// Names of the steps the build would run, in order.
    pub fn plan(&self) -> Vec<String> {
        Runner::new(self.builder.steps(&self.communicator)).step_names()
    }
}

/// Reads a profile from a YAML file.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, PackstepError> {
    let file = File::open(path)
        .map_err(|e| PackstepError::io(format!("failed to load file: {}", path), e))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader)
        .map_err(|e| PackstepError::Config(format!("failed to parse yaml {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYPERV: &str = r#"
builder:
  type: hyperv-vmcx
  clone_from_vm_name: golden
  vm_name: build
"#;

    #[test]
    fn test_builder_type_selects_variant() {
        let profile: Profile = serde_yaml::from_str(HYPERV).unwrap();
        assert_eq!(profile.builder.name(), "hyperv-vmcx");
        assert_eq!(profile.communicator, CommunicatorConfig::None);
        assert!(profile.provisioners.is_empty());
    }

    #[test]
    fn test_unknown_builder_type_is_rejected() {
        let err = serde_yaml::from_str::<Profile>("builder:\n  type: qemu\n").unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn test_prepare_rejects_provisioners_without_communicator() {
        let yaml = format!("{}provisioners:\n  - type: shell\n    inline: [\"true\"]\n", HYPERV);
        let mut profile: Profile = serde_yaml::from_str(&yaml).unwrap();
        let err = profile.prepare().unwrap_err();
        assert!(matches!(err, PackstepError::Validation(_)));
        assert!(err.to_string().contains("require a communicator"));
    }

    #[test]
    fn test_plan_lists_conditional_steps() {
        let mut profile: Profile = serde_yaml::from_str(HYPERV).unwrap();
        profile.prepare().unwrap();
        let plan = profile.plan();
        assert_eq!(plan.first().map(String::as_str), Some("create-build-dir"));
        assert!(plan.contains(&"export-vm".to_string()));
        assert!(!plan.contains(&"configure-vlan".to_string()));
    }
}
