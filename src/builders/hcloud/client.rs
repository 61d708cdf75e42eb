//! The Hetzner Cloud API surface used by the builder.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::error::PackstepError;
use crate::multistep::CancelToken;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};

/// Status of an asynchronous API action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub location: Option<String>,
    pub user_data: Option<String>,
    pub ssh_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedServer {
    pub id: String,
    pub ipv4: String,
    pub action_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedImage {
    pub id: String,
    pub action_id: String,
}

/// Operations the hcloud steps need from the API.
pub trait HcloudClient: Send + Sync {
    fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<String>;
    fn delete_ssh_key(&self, id: &str) -> Result<()>;

    fn create_server(&self, request: &ServerRequest) -> Result<CreatedServer>;
    fn delete_server(&self, id: &str) -> Result<()>;
    fn enable_rescue(&self, server_id: &str, rescue: &str, ssh_keys: &[String]) -> Result<String>;
    fn reboot_server(&self, server_id: &str) -> Result<String>;
    fn shutdown_server(&self, server_id: &str) -> Result<String>;

    fn create_image(
        &self,
        server_id: &str,
        description: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<CreatedImage>;
    fn delete_image(&self, id: &str) -> Result<()>;

    fn action_status(&self, action_id: &str) -> Result<ActionStatus>;
}

/// Waits for an action to finish successfully.
pub(super) fn wait_for_action(
    client: &dyn HcloudClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    action_id: &str,
) -> Result<()> {
    wait_for(&format!("action {}", action_id), cancel, wait, || {
        match client.action_status(action_id)? {
            ActionStatus::Running => Ok(Poll::Pending),
            ActionStatus::Success => Ok(Poll::Ready(())),
            ActionStatus::Error(message) => Err(PackstepError::unexpected_state(
                format!("action {}", action_id),
                format!("error: {}", message),
            )
            .into()),
        }
    })
}
