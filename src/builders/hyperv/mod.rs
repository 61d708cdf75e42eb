//! Hyper-V builder: clones an existing machine and exports the result.
//!
//! Sequence: create build directory, prepare output directory, clone,
//! optionally enable guest services and a VLAN, start, connect, provision,
//! shut down, then compact, export and move the export into the output
//! directory. The clone is unregistered on cleanup unless `keep_registered`.

mod artifact;
mod config;
mod driver;
mod powershell;
mod step_clone_vm;
mod step_export;
mod step_run;

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;

pub use artifact::{BUILDER_ID, HypervArtifact};
pub use config::HypervConfig;
pub use driver::{CloneRequest, Driver};
pub use powershell::PowerShellDriver;
pub use step_clone_vm::StepCloneVm;
pub use step_export::{StepCollateArtifacts, StepCompactDisk, StepExportVm};
pub use step_run::{StepConfigureVlan, StepEnableIntegrationService, StepShutdown, StepStartVm};

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::steps::{OUTPUT_DIR, StepCreateBuildDir, StepOutputDir};
use crate::ui::Ui;

pub const CONFIG: StateKey<HypervConfig> = StateKey::new("config");
pub const DRIVER: StateKey<Arc<dyn Driver>> = StateKey::new("driver");
pub const VM_NAME: StateKey<String> = StateKey::new("vmName");
pub const EXPORT_DIR: StateKey<Utf8PathBuf> = StateKey::new("export_dir");

fn guest_ip(state: &StateBag) -> Result<String> {
    let driver = state.get(DRIVER)?;
    let vm = state.get(VM_NAME)?;
    let mac = driver.mac(vm).context("failed to read the adapter's MAC address")?;
    driver
        .ip_address(&mac)
        .with_context(|| format!("failed to look up the address of {}", mac))
}

/// Assembles the Hyper-V step sequence.
pub fn steps(config: &HypervConfig, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(StepCreateBuildDir::new(config.temp_path.clone())),
        Box::new(StepOutputDir::new(config.output_dir.clone(), config.force)),
        Box::new(StepCloneVm::default()),
    ];
    if config.guest_services {
        steps.push(Box::new(StepEnableIntegrationService));
    }
    if let Some(vlan_id) = config.vlan_id {
        steps.push(Box::new(StepConfigureVlan::new(vlan_id)));
    }
    steps.push(Box::new(StepStartVm::default()));
    steps.push(Box::new(StepConnect::new(communicator.clone(), guest_ip)));
    steps.push(Box::new(StepProvision));
    steps.push(Box::new(StepShutdown));
    if !config.skip_compaction {
        steps.push(Box::new(StepCompactDisk));
    }
    if !config.skip_export {
        steps.push(Box::new(StepExportVm));
        steps.push(Box::new(StepCollateArtifacts));
    }
    steps
}

pub struct HypervBuilder {
    config: HypervConfig,
    communicator: CommunicatorConfig,
    driver: Arc<dyn Driver>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl HypervBuilder {
    pub fn new(
        config: HypervConfig,
        communicator: CommunicatorConfig,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self {
            config,
            communicator,
            driver,
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
        let mut warnings = self.config.prepare()?;
        warnings.extend(self.communicator.prepare()?);
        Ok(warnings)
    }

    pub fn config(&self) -> &HypervConfig {
        &self.config
    }
}

impl Builder for HypervBuilder {
    fn name(&self) -> &'static str {
        "hyperv-vmcx"
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        self.driver.verify().context("Hyper-V is not usable on this host")?;

        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(DRIVER, Arc::clone(&self.driver));

        active.run(steps(&self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            if self.config.skip_export {
                return Ok(None);
            }
            let output_dir = state.get(OUTPUT_DIR)?.clone();
            Ok(Some(Box::new(HypervArtifact::from_dir(output_dir)?)))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
