//! The Triton CloudAPI surface used by the builder.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::error::PackstepError;
use crate::multistep::CancelToken;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRequest {
    pub name: String,
    pub package: String,
    pub image: String,
    pub networks: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    /// `provisioning`, `running`, `stopping`, `stopped`, `failed`...
    pub state: String,
    pub primary_ip: Option<String>,
}

/// Operations the triton steps need from the API.
pub trait TritonClient: Send + Sync {
    fn create_machine(&self, request: &MachineRequest) -> Result<String>;
    /// Returns `None` once the machine no longer exists.
    fn get_machine(&self, id: &str) -> Result<Option<Machine>>;
    fn stop_machine(&self, id: &str) -> Result<()>;
    fn delete_machine(&self, id: &str) -> Result<()>;

    fn create_image_from_machine(&self, machine_id: &str, request: &ImageRequest) -> Result<String>;
    /// `creating`, `active` or `failed`.
    fn image_state(&self, id: &str) -> Result<String>;
    fn delete_image(&self, id: &str) -> Result<()>;
}

/// Waits for a machine to reach `target`, returning it.
pub(super) fn wait_for_machine(
    client: &dyn TritonClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
    target: &str,
) -> Result<Machine> {
    let resource = format!("machine {}", id);
    wait_for(&format!("{} to be {}", resource, target), cancel, wait, || {
        let Some(machine) = client.get_machine(id)? else {
            return Err(PackstepError::unexpected_state(&resource, "deleted").into());
        };
        if machine.state == target {
            Ok(Poll::Ready(machine))
        } else if machine.state == "failed" {
            Err(PackstepError::unexpected_state(&resource, "failed").into())
        } else {
            Ok(Poll::Pending)
        }
    })
}

pub(super) fn wait_for_machine_gone(
    client: &dyn TritonClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<()> {
    wait_for(&format!("machine {} to be deleted", id), cancel, wait, || {
        Ok(match client.get_machine(id)? {
            Some(_) => Poll::Pending,
            None => Poll::Ready(()),
        })
    })
}

pub(super) fn wait_for_image(
    client: &dyn TritonClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<()> {
    let resource = format!("image {}", id);
    wait_for(&format!("{} to become active", resource), cancel, wait, || {
        match client.image_state(id)?.as_str() {
            "active" => Ok(Poll::Ready(())),
            "failed" => Err(PackstepError::unexpected_state(&resource, "failed").into()),
            _ => Ok(Poll::Pending),
        }
    })
}
