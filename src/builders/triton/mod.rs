//! Triton builder: images a source machine, then deletes it.

mod client;
mod config;
mod steps;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use client::{ImageRequest, Machine, MachineRequest, TritonClient};
pub use config::TritonConfig;
pub use steps::{
    StepCreateImageFromMachine, StepCreateSourceMachine, StepDeleteMachine, StepStopMachine,
};

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::wait::WaitConfig;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::ui::Ui;

pub const BUILDER_ID: &str = "triton.image";

pub const CONFIG: StateKey<TritonConfig> = StateKey::new("config");
pub const CLIENT: StateKey<Arc<dyn TritonClient>> = StateKey::new("client");
pub const MACHINE: StateKey<String> = StateKey::new("machine");
pub const MACHINE_IP: StateKey<String> = StateKey::new("machine_ip");
pub const IMAGE: StateKey<String> = StateKey::new("image");

fn wait_config(config: &TritonConfig) -> WaitConfig {
    WaitConfig::new(config.poll_interval(), config.state_timeout())
}

fn machine_ip(state: &StateBag) -> Result<String> {
    Ok(state.get(MACHINE_IP)?.clone())
}

pub fn steps(_config: &TritonConfig, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(StepCreateSourceMachine),
        Box::new(StepConnect::new(communicator.clone(), machine_ip)),
        Box::new(StepProvision),
        Box::new(StepStopMachine),
        Box::new(StepCreateImageFromMachine::default()),
        Box::new(StepDeleteMachine),
    ]
}

pub struct TritonArtifact {
    pub image_id: String,
    client: Arc<dyn TritonClient>,
}

impl fmt::Debug for TritonArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TritonArtifact")
            .field("image_id", &self.image_id)
            .finish_non_exhaustive()
    }
}

impl Artifact for TritonArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        self.image_id.clone()
    }

    fn string(&self) -> String {
        format!("Image was created: {}", self.image_id)
    }

    fn destroy(&self) -> Result<()> {
        tracing::info!(image_id = %self.image_id, "deleting image");
        self.client
            .delete_image(&self.image_id)
            .with_context(|| format!("failed to delete image {}", self.image_id))
    }
}

pub struct TritonBuilder {
    config: TritonConfig,
    communicator: CommunicatorConfig,
    client: Arc<dyn TritonClient>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl TritonBuilder {
    pub fn new(
        config: TritonConfig,
        communicator: CommunicatorConfig,
        client: Arc<dyn TritonClient>,
    ) -> Self {
        Self {
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
        let mut warnings = self.config.prepare()?;
        warnings.extend(self.communicator.prepare()?);
        Ok(warnings)
    }
}

impl Builder for TritonBuilder {
    fn name(&self) -> &'static str {
        "triton"
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(CLIENT, Arc::clone(&self.client));

        active.run(steps(&self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            Ok(state.remove(IMAGE).map(|image_id| {
                Box::new(TritonArtifact {
                    image_id,
                    client: Arc::clone(&self.client),
                }) as Box<dyn Artifact>
            }))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
