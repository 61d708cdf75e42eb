//! The 1&1 Cloud Server API surface used by the builder.

use anyhow::Result;

use crate::error::PackstepError;
use crate::multistep::CancelToken;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};

pub const SERVER_POWERED_ON: &str = "POWERED_ON";
pub const IMAGE_ACTIVE: &str = "ACTIVE";

/// States after which a resource never becomes usable.
const FAILED_STATES: [&str; 2] = ["ERROR", "FAILED"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRequest {
    pub name: String,
    pub appliance_id: String,
    pub data_center_id: Option<String>,
    pub disk_size: u32,
    pub ssh_public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub state: String,
    pub ip: Option<String>,
}

/// Operations the oneandone steps need from the API.
pub trait OneandoneClient: Send + Sync {
    /// Resolves a server appliance name to its ID.
    fn find_appliance(&self, name: &str) -> Result<String>;
    fn find_data_center(&self, name: &str) -> Result<String>;

    fn create_server(&self, request: &ServerRequest) -> Result<String>;
    fn server_status(&self, id: &str) -> Result<ServerStatus>;
    fn delete_server(&self, id: &str) -> Result<()>;

    fn create_image(&self, server_id: &str, name: &str) -> Result<String>;
    fn image_state(&self, id: &str) -> Result<String>;
    fn delete_image(&self, id: &str) -> Result<()>;
}

/// Fails a poll on a terminal failure state.
fn check_failed(resource: &str, state: &str) -> Result<(), PackstepError> {
    if FAILED_STATES.contains(&state) {
        Err(PackstepError::unexpected_state(resource, state))
    } else {
        Ok(())
    }
}

/// Waits for the server to power on and returns its public IP.
pub(super) fn wait_for_server(
    client: &dyn OneandoneClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<String> {
    let resource = format!("server {}", id);
    wait_for(&format!("{} to power on", resource), cancel, wait, || {
        let status = client.server_status(id)?;
        check_failed(&resource, &status.state)?;
        match (status.state.as_str(), status.ip) {
            (SERVER_POWERED_ON, Some(ip)) => Ok(Poll::Ready(ip)),
            _ => Ok(Poll::Pending),
        }
    })
}

pub(super) fn wait_for_image(
    client: &dyn OneandoneClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<()> {
    let resource = format!("image {}", id);
    wait_for(&format!("{} to become active", resource), cancel, wait, || {
        let state = client.image_state(id)?;
        check_failed(&resource, &state)?;
        Ok(if state == IMAGE_ACTIVE { Poll::Ready(()) } else { Poll::Pending })
    })
}
