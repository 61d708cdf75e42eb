//! Hetzner Cloud builder: snapshots a temporary server.
//!
//! Sequence: create temporary SSH key, create server, optionally reboot into
//! rescue mode, connect, provision, shut down, snapshot. The key and the
//! server are always removed; the snapshot only when the build fails.

mod artifact;
mod client;
mod config;
mod step_server;
mod step_snapshot;
mod step_ssh_key;

use std::sync::Arc;

use anyhow::Result;

pub use artifact::{BUILDER_ID, HcloudArtifact};
pub use client::{ActionStatus, CreatedImage, CreatedServer, HcloudClient, ServerRequest};
pub use config::HcloudConfig;
pub use step_server::{StepCreateServer, StepRescue, StepShutdown};
pub use step_snapshot::StepCreateSnapshot;
pub use step_ssh_key::StepCreateSshKey;

use crate::artifact::Artifact;
use crate::builder::{Builder, RunnerHandle, finish};
use crate::builders::new_state;
use crate::communicator::{CommunicatorConfig, Connector, StepConnect};
use crate::error::PackstepError;
use crate::multistep::wait::WaitConfig;
use crate::multistep::{StateBag, StateKey, Step};
use crate::provisioners::{Hook, StepProvision};
use crate::ui::Ui;

pub const CONFIG: StateKey<HcloudConfig> = StateKey::new("config");
pub const CLIENT: StateKey<Arc<dyn HcloudClient>> = StateKey::new("hcloudClient");
pub const SSH_KEY_ID: StateKey<String> = StateKey::new("ssh_key_id");
pub const SERVER_ID: StateKey<String> = StateKey::new("server_id");
pub const SERVER_IP: StateKey<String> = StateKey::new("server_ip");
pub const SNAPSHOT_ID: StateKey<String> = StateKey::new("snapshot_id");
pub const SNAPSHOT_NAME: StateKey<String> = StateKey::new("snapshot_name");

fn wait_config(config: &HcloudConfig) -> WaitConfig {
    WaitConfig::new(config.poll_interval(), config.state_timeout())
}

fn server_ip(state: &StateBag) -> Result<String> {
    Ok(state.get(SERVER_IP)?.clone())
}

/// Assembles the hcloud step sequence.
pub fn steps(config: &HcloudConfig, communicator: &CommunicatorConfig) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(StepCreateSshKey::default()),
        Box::new(StepCreateServer::default()),
    ];
    if config.rescue.is_some() {
        steps.push(Box::new(StepRescue));
    }
    steps.push(Box::new(StepConnect::new(communicator.clone(), server_ip)));
    steps.push(Box::new(StepProvision));
    steps.push(Box::new(StepShutdown));
    steps.push(Box::new(StepCreateSnapshot::default()));
    steps
}

pub struct HcloudBuilder {
    config: HcloudConfig,
    communicator: CommunicatorConfig,
    client: Arc<dyn HcloudClient>,
    connector: Option<Arc<dyn Connector>>,
    runner: RunnerHandle,
}

impl HcloudBuilder {
    pub fn new(
        config: HcloudConfig,
        communicator: CommunicatorConfig,
        client: Arc<dyn HcloudClient>,
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

    pub fn config(&self) -> &HcloudConfig {
        &self.config
    }
}

impl Builder for HcloudBuilder {
    fn name(&self) -> &'static str {
        "hcloud"
    }

    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>> {
        let active = self.runner.begin();
        let mut state = new_state(ui, hook, self.connector.as_ref());
        state.put(CONFIG, self.config.clone());
        state.put(CLIENT, Arc::clone(&self.client));

        active.run(steps(&self.config, &self.communicator), &mut state);

        finish(&mut state, |state| {
            let Some(id) = state.remove(SNAPSHOT_ID) else {
                return Ok(None);
            };
            let name = state.remove(SNAPSHOT_NAME).unwrap_or_default();
            Ok(Some(Box::new(HcloudArtifact::new(id, name, Arc::clone(&self.client)))))
        })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}
