//! Outscale builders.
//!
//! `osc-bsu` images the build VM directly. `osc-bsusurrogate` snapshots the
//! VM's launch volumes and registers an OMI from those snapshots. Temporary
//! key pairs and security groups exist only when the configuration does not
//! name existing ones.

mod artifact;
mod client;
mod config;
mod step_omi;
mod step_source;
mod step_surrogate;
mod step_vm;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

pub use artifact::{BUILDER_ID, OscArtifact};
pub use client::{
    AttachedVolume, OmiQuery, OmiRequest, OscClient, RegisterRequest, SourceOmi, Vm, VmRequest,
};
pub use config::{BlockDevice, OmiFilter, OscConfig, RootDevice};
pub use step_omi::{StepCreateOmi, StepCreateTags, StepUpdateOmiAttributes};
pub use step_source::{StepKeyPair, StepSecurityGroup, StepSourceOmiInfo};
pub use step_surrogate::{StepRegisterOmi, StepSnapshotVolumes};
pub use step_vm::{StepRunSourceVm, StepStopVm};

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::wait::WaitConfig;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::ui::Ui;

pub const CONFIG: StateKey<OscConfig> = StateKey::new("config");
pub const CLIENT: StateKey<Arc<dyn OscClient>> = StateKey::new("osc");
pub const SOURCE_OMI: StateKey<SourceOmi> = StateKey::new("source_image");
pub const KEYPAIR_NAME: StateKey<String> = StateKey::new("keyPair");
pub const PRIVATE_KEY: StateKey<String> = StateKey::new("privateKey");
pub const SECURITY_GROUP_IDS: StateKey<Vec<String>> = StateKey::new("securityGroupIds");
pub const VM_ID: StateKey<String> = StateKey::new("vm_id");
pub const VM: StateKey<Vm> = StateKey::new("vm");
pub const SNAPSHOTS: StateKey<BTreeMap<String, String>> = StateKey::new("snapshots");
pub const OMI_ID: StateKey<String> = StateKey::new("omi");

fn wait_config(config: &OscConfig) -> WaitConfig {
    WaitConfig::new(config.poll_interval(), config.state_timeout())
}

fn vm_ip(state: &StateBag) -> Result<String> {
    let vm = state.get(VM)?;
    let ip = vm.public_ip.as_ref().or(vm.private_ip.as_ref());
    match ip {
        Some(ip) => Ok(ip.clone()),
        None => {
            let id = state.get_ok(VM_ID).map_or("unknown", String::as_str);
            Err(PackstepError::unexpected_state(format!("vm {}", id), "no IP address").into())
        }
    }
}

/// Which OMI creation strategy the builder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscFlavor {
    /// Create the OMI from the VM.
    Bsu,
    /// Register the OMI from snapshots of the launch volumes.
    BsuSurrogate,
}

/// Assembles the step sequence for `flavor`.
pub fn steps(
    flavor: OscFlavor,
    config: &OscConfig,
    communicator: &CommunicatorConfig,
) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(StepSourceOmiInfo)];
    if config.ssh_keypair_name.is_none() {
        steps.push(Box::new(StepKeyPair::default()));
    }
    if config.security_group_ids.is_empty() {
        steps.push(Box::new(StepSecurityGroup::new(communicator.port())));
    }
    steps.push(Box::new(StepRunSourceVm::default()));
    steps.push(Box::new(StepConnect::new(communicator.clone(), vm_ip)));
    steps.push(Box::new(StepProvision));
    if !config.disable_stop_vm {
        steps.push(Box::new(StepStopVm));
    }
    match flavor {
        OscFlavor::Bsu => steps.push(Box::new(StepCreateOmi::default())),
        OscFlavor::BsuSurrogate => {
            steps.push(Box::new(StepSnapshotVolumes::default()));
            steps.push(Box::new(StepRegisterOmi::default()));
        }
    }
    if !config.omi_account_ids.is_empty() || !config.omi_groups.is_empty() {
        steps.push(Box::new(StepUpdateOmiAttributes));
    }
    if !config.tags.is_empty() || !config.snapshot_tags.is_empty() {
        steps.push(Box::new(StepCreateTags));
    }
    steps
}

pub struct OscBuilder {
    flavor: OscFlavor,
    config: OscConfig,
    communicator: CommunicatorConfig,
    client: Arc<dyn OscClient>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl OscBuilder {
    pub fn new(
        flavor: OscFlavor,
        config: OscConfig,
        communicator: CommunicatorConfig,
        client: Arc<dyn OscClient>,
    ) -> Self {
        Self {
            flavor,
            config,
            communicator,
            client,
            connector: None,
            runner: RunnerHandle::new(),
        }
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn prepare(&mut self) -> Result<Vec<String>, PackstepError> {
        let mut warnings = match self.flavor {
            OscFlavor::Bsu => self.config.prepare()?,
            OscFlavor::BsuSurrogate => self.config.prepare_surrogate()?,
        };
        warnings.extend(self.communicator.prepare()?);
        Ok(warnings)
    }
}

impl Builder for OscBuilder {
    fn name(&self) -> &'static str {
        match self.flavor {
            OscFlavor::Bsu => "osc-bsu",
            OscFlavor::BsuSurrogate => "osc-bsusurrogate",
        }
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(CLIENT, Arc::clone(&self.client));

        active.run(steps(self.flavor, &self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            let Some(omi_id) = state.remove(OMI_ID) else {
                return Ok(None);
            };
            let region = self.config.region.clone();
            let artifact = OscArtifact::new(omi_id, region, Arc::clone(&self.client));
            Ok(Some(Box::new(artifact)))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
