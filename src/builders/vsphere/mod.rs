//! vSphere clone builder: clones a template into a new VM or template.
//!
//! The clone itself is the deliverable, so nothing is deleted after a
//! successful build.

mod config;
mod driver;
mod step_clone;
mod step_finalize;
mod step_power;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use config::VsphereConfig;
pub use driver::{CloneSpec, HardwareSpec, VsphereDriver};
pub use step_clone::{StepCloneVm, StepConfigureHardware};
pub use step_finalize::{StepConvertToTemplate, StepCreateSnapshot};
pub use step_power::{StepPowerOn, StepShutdown, StepWaitForIp};

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::ui::Ui;

pub const BUILDER_ID: &str = "vsphere.clone";

pub const CONFIG: StateKey<VsphereConfig> = StateKey::new("config");
pub const DRIVER: StateKey<Arc<dyn VsphereDriver>> = StateKey::new("driver");
pub const VM: StateKey<String> = StateKey::new("vm");
pub const VM_IP: StateKey<String> = StateKey::new("ip");

fn vm_ip(state: &StateBag) -> Result<String> {
    Ok(state.get(VM_IP)?.clone())
}

pub fn steps(config: &VsphereConfig, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(StepCloneVm::default())];
    if config.has_hardware() {
        steps.push(Box::new(StepConfigureHardware));
    }
    steps.push(Box::new(StepPowerOn::default()));
    steps.push(Box::new(StepWaitForIp));
    steps.push(Box::new(StepConnect::new(communicator.clone(), vm_ip)));
    steps.push(Box::new(StepProvision));
    steps.push(Box::new(StepShutdown));
    if config.create_snapshot {
        steps.push(Box::new(StepCreateSnapshot));
    }
    if config.convert_to_template {
        steps.push(Box::new(StepConvertToTemplate));
    }
    steps
}

/// The cloned VM (or template).
pub struct VsphereArtifact {
    pub name: String,
    pub vm: String,
    driver: Arc<dyn VsphereDriver>,
}

impl fmt::Debug for VsphereArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsphereArtifact")
            .field("name", &self.name)
            .field("vm", &self.vm)
            .finish_non_exhaustive()
    }
}

impl Artifact for VsphereArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        self.name.clone()
    }

    fn string(&self) -> String {
        format!("VM: {}", self.name)
    }

    fn destroy(&self) -> Result<()> {
        self.driver
            .destroy(&self.vm)
            .with_context(|| format!("failed to destroy virtual machine {}", self.name))
    }
}

pub struct VsphereBuilder {
    config: VsphereConfig,
    communicator: CommunicatorConfig,
    driver: Arc<dyn VsphereDriver>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl VsphereBuilder {
    pub fn new(
        config: VsphereConfig,
        communicator: CommunicatorConfig,
        driver: Arc<dyn VsphereDriver>,
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
}

impl Builder for VsphereBuilder {
    fn name(&self) -> &'static str {
        "vsphere-clone"
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(DRIVER, Arc::clone(&self.driver));

        active.run(steps(&self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            let Some(vm) = state.remove(VM) else {
                return Ok(None);
            };
            Ok(Some(Box::new(VsphereArtifact {
                name: self.config.vm_name.clone(),
                vm,
                driver: Arc::clone(&self.driver),
            })))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
