//! The Outscale API surface used by the BSU builders.

use std::collections::BTreeMap;

use anyhow::Result;

use super::config::{BlockDevice, OmiFilter};
use crate::error::PackstepError;
use crate::multistep::CancelToken;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};

/// Where the source OMI comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmiQuery {
    Id(String),
    Filter(OmiFilter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOmi {
    pub id: String,
    pub name: String,
    /// `bsu` for volume-backed images.
    pub root_device_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRequest {
    pub omi_id: String,
    pub vm_type: String,
    pub keypair_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub subregion_name: Option<String>,
    pub subnet_id: Option<String>,
    pub user_data: Option<String>,
    pub block_devices: Vec<BlockDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedVolume {
    pub device_name: String,
    pub volume_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    /// `pending`, `running`, `stopping`, `stopped`, `terminated`...
    pub state: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub volumes: Vec<AttachedVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmiRequest {
    pub name: String,
    pub description: Option<String>,
}

/// An OMI registered from snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub name: String,
    pub description: Option<String>,
    pub root_device_name: String,
    /// Device name to snapshot ID.
    pub block_devices: BTreeMap<String, String>,
}

/// Operations the osc steps need from the API.
pub trait OscClient: Send + Sync {
    fn find_omi(&self, query: &OmiQuery) -> Result<Option<SourceOmi>>;

    /// Creates a key pair and returns its private key.
    fn create_keypair(&self, name: &str) -> Result<String>;
    fn delete_keypair(&self, name: &str) -> Result<()>;
    fn create_security_group(&self, name: &str, source_cidr: &str, port: u16) -> Result<String>;
    fn delete_security_group(&self, id: &str) -> Result<()>;

    fn create_vm(&self, request: &VmRequest) -> Result<String>;
    fn read_vm(&self, id: &str) -> Result<Vm>;
    fn stop_vm(&self, id: &str) -> Result<()>;
    fn delete_vm(&self, id: &str) -> Result<()>;

    fn create_omi(&self, vm_id: &str, request: &OmiRequest) -> Result<String>;
    fn register_omi(&self, request: &RegisterRequest) -> Result<String>;
    /// `pending`, `available` or `failed`.
    fn omi_state(&self, id: &str) -> Result<String>;
    fn delete_omi(&self, id: &str) -> Result<()>;
    fn update_omi_permissions(
        &self,
        id: &str,
        account_ids: &[String],
        groups: &[String],
    ) -> Result<()>;

    fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String>;
    /// `pending`, `completed` or `error`.
    fn snapshot_state(&self, id: &str) -> Result<String>;
    fn delete_snapshot(&self, id: &str) -> Result<()>;

    fn create_tags(&self, resource_ids: &[String], tags: &BTreeMap<String, String>) -> Result<()>;
}

/// Polls a resource state until it is `ready`, failing on `failed`.
fn wait_for_state(
    resource: &str,
    ready: &str,
    failed: &[&str],
    cancel: &CancelToken,
    wait: WaitConfig,
    mut fetch_state: impl FnMut() -> Result<String>,
) -> Result<()> {
    wait_for(&format!("{} to be {}", resource, ready), cancel, wait, || {
        let state = fetch_state()?;
        if state == ready {
            Ok(Poll::Ready(()))
        } else if failed.contains(&state.as_str()) {
            Err(PackstepError::unexpected_state(resource, state).into())
        } else {
            Ok(Poll::Pending)
        }
    })
}

pub(super) fn wait_for_vm(
    client: &dyn OscClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
    ready: &str,
) -> Result<()> {
    wait_for_state(
        &format!("vm {}", id),
        ready,
        &["terminated", "shutting-down"],
        cancel,
        wait,
        || Ok(client.read_vm(id)?.state),
    )
}

pub(super) fn wait_for_omi(
    client: &dyn OscClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<()> {
    wait_for_state(&format!("omi {}", id), "available", &["failed"], cancel, wait, || {
        client.omi_state(id)
    })
}

pub(super) fn wait_for_snapshot(
    client: &dyn OscClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    id: &str,
) -> Result<()> {
    wait_for_state(&format!("snapshot {}", id), "completed", &["error"], cancel, wait, || {
        client.snapshot_state(id)
    })
}
