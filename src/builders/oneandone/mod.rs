//! 1&1 builder: images a temporary cloud server.

mod client;
mod config;
mod steps;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

pub use client::{IMAGE_ACTIVE, OneandoneClient, SERVER_POWERED_ON, ServerRequest, ServerStatus};
pub use config::OneandoneConfig;
pub use steps::{StepCreateServer, StepCreateSshKey, StepTakeSnapshot};

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::wait::WaitConfig;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::ui::Ui;

pub const BUILDER_ID: &str = "oneandone.image";

pub const CONFIG: StateKey<OneandoneConfig> = StateKey::new("config");
pub const CLIENT: StateKey<Arc<dyn OneandoneClient>> = StateKey::new("oneandoneClient");
pub const SSH_PUBLIC_KEY: StateKey<String> = StateKey::new("publicKey");
pub const SERVER_ID: StateKey<String> = StateKey::new("server_id");
pub const SERVER_IP: StateKey<String> = StateKey::new("server_ip");
pub const IMAGE_ID: StateKey<String> = StateKey::new("image_id");
pub const IMAGE_NAME: StateKey<String> = StateKey::new("image_name");

fn wait_config(config: &OneandoneConfig) -> WaitConfig {
    WaitConfig::new(config.poll_interval(), config.state_timeout())
}

fn server_ip(state: &StateBag) -> Result<String> {
    Ok(state.get(SERVER_IP)?.clone())
}

pub fn steps(_config: &OneandoneConfig, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(StepCreateSshKey),
        Box::new(StepCreateServer::default()),
        Box::new(StepConnect::new(communicator.clone(), server_ip)),
        Box::new(StepProvision),
        Box::new(StepTakeSnapshot::default()),
    ]
}

/// A 1&1 server image.
pub struct OneandoneArtifact {
    pub image_id: String,
    pub image_name: String,
    client: Arc<dyn OneandoneClient>,
}

impl fmt::Debug for OneandoneArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneandoneArtifact")
            .field("image_id", &self.image_id)
            .field("image_name", &self.image_name)
            .finish_non_exhaustive()
    }
}

impl Artifact for OneandoneArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        self.image_id.clone()
    }

    fn string(&self) -> String {
        format!("A snapshot was created: '{}'", self.image_name)
    }

    fn destroy(&self) -> Result<()> {
        self.client
            .delete_image(&self.image_id)
            .with_context(|| format!("failed to delete image {}", self.image_id))
    }
}

pub struct OneandoneBuilder {
    config: OneandoneConfig,
    communicator: CommunicatorConfig,
    client: Arc<dyn OneandoneClient>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl OneandoneBuilder {
    pub fn new(
        config: OneandoneConfig,
        communicator: CommunicatorConfig,
        client: Arc<dyn OneandoneClient>,
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

impl Builder for OneandoneBuilder {
    fn name(&self) -> &'static str {
        "oneandone"
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(CLIENT, Arc::clone(&self.client));

        active.run(steps(&self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            let Some(image_id) = state.remove(IMAGE_ID) else {
                return Ok(None);
            };
            Ok(Some(Box::new(OneandoneArtifact {
                image_id,
                image_name: state.remove(IMAGE_NAME).unwrap_or_default(),
                client: Arc::clone(&self.client),
            })))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
