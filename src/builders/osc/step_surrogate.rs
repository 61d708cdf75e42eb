use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error};

use super::client::{OscClient, RegisterRequest, wait_for_omi, wait_for_snapshot};
use super::step_omi::cleanup_omi;
use super::{CLIENT, CONFIG, OMI_ID, SNAPSHOTS, VM, VM_ID, wait_config};
use crate::error::PackstepError;
use crate::multistep::wait::WaitConfig;
use crate::multistep::{CancelToken, StateBag, Step, StepAction, halt};
use crate::try_step;

/// Outcome of snapshotting one device.
struct DeviceSnapshot {
    device: String,
    snapshot_id: Option<String>,
    result: Result<()>,
}

fn snapshot_device(
    client: &dyn OscClient,
    cancel: &CancelToken,
    wait: WaitConfig,
    device: String,
    volume_id: &str,
    description: &str,
) -> DeviceSnapshot {
    let snapshot_id = match client.create_snapshot(volume_id, description) {
        Ok(id) => id,
        Err(e) => {
            return DeviceSnapshot {
                device,
                snapshot_id: None,
                result: Err(e.context(format!("failed to snapshot volume {}", volume_id))),
            };
        }
    };
    debug!(%device, %snapshot_id, "waiting for snapshot");
    let result = wait_for_snapshot(client, cancel, wait, &snapshot_id);
    DeviceSnapshot {
        device,
        snapshot_id: Some(snapshot_id),
        result,
    }
}

/// Snapshots every launch volume of the stopped VM in parallel.
///
/// All snapshots that were started are remembered, even when another device
/// failed, and deleted on cleanup if the build fails.
#[derive(Debug, Default)]
pub struct StepSnapshotVolumes {
    snapshot_ids: Vec<String>,
}

impl Step for StepSnapshotVolumes {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("snapshot-volumes")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm_id = try_step!(state, state.get(VM_ID).cloned());
        let vm = try_step!(state, state.get(VM).cloned());
        let wait = wait_config(&config);

        let mut volumes = Vec::new();
        for device in &config.launch_block_device_mappings {
            let attached = vm.volumes.iter().find(|v| v.device_name == device.device_name);
            let Some(attached) = attached else {
                return halt(
                    state,
                    PackstepError::unexpected_state(
                        format!("vm {}", vm_id),
                        format!("no volume attached at {}", device.device_name),
                    ),
                );
            };
            volumes.push(attached.clone());
        }

        state.ui().say(&format!("Creating {} snapshot(s) of vm {}...", volumes.len(), vm_id));
        let description = format!("packer: {}", config.omi_name);
        let outcomes: Vec<DeviceSnapshot> = thread::scope(|scope| {
            let handles: Vec<_> = volumes
                .iter()
                .map(|volume| {
                    let client: &dyn OscClient = client.as_ref();
                    let description = description.as_str();
                    scope.spawn(move || {
                        snapshot_device(
                            client,
                            cancel,
                            wait,
                            volume.device_name.clone(),
                            &volume.volume_id,
                            description,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(&volumes)
                .map(|(handle, volume)| {
                    handle.join().unwrap_or_else(|panic| DeviceSnapshot {
                        device: volume.device_name.clone(),
                        snapshot_id: None,
                        result: Err(anyhow!(
                            "snapshot worker panicked: {}",
                            crate::executor::panic_message(&*panic)
                        )),
                    })
                })
                .collect()
        });

        let mut snapshots = BTreeMap::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            if let Some(id) = &outcome.snapshot_id {
                self.snapshot_ids.push(id.clone());
            }
            match (outcome.result, outcome.snapshot_id) {
                (Ok(()), Some(id)) => {
                    snapshots.insert(outcome.device, id);
                }
                (Err(e), _) => {
                    error!(device = %outcome.device, "snapshot failed: {:#}", e);
                    failures.push(format!("{}: {:#}", outcome.device, e));
                }
                (Ok(()), None) => {}
            }
        }
        if !failures.is_empty() {
            return halt(
                state,
                anyhow!("failed to snapshot volumes: {}", failures.join("; ")),
            );
        }
        state.put(SNAPSHOTS, snapshots);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        if !state.is_failed() || self.snapshot_ids.is_empty() {
            return Ok(());
        }
        let client: Arc<dyn OscClient> = state.get(CLIENT)?.clone();
        state.ui().say("Removing snapshots since we cancelled or halted...");
        let mut failed = Vec::new();
        for id in self.snapshot_ids.drain(..) {
            if let Err(e) = client.delete_snapshot(&id) {
                error!(snapshot = %id, "failed to delete snapshot: {:#}", e);
                failed.push(id);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("failed to delete snapshots {}, delete them manually", failed.join(", ")))
        }
    }
}

/// Registers the OMI from the volume snapshots.
#[derive(Debug, Default)]
pub struct StepRegisterOmi {
    omi_id: Option<String>,
}

impl Step for StepRegisterOmi {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("register-omi")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let snapshots = try_step!(state, state.get(SNAPSHOTS).cloned());
        let Some(root) = config.root_device.clone() else {
            return halt(state, PackstepError::Validation("root_device is required".into()));
        };

        // The root volume is registered under its target device name.
        let block_devices: BTreeMap<String, String> = snapshots
            .into_iter()
            .map(|(device, id)| {
                if device == root.source_device_name {
                    (root.device_name.clone(), id)
                } else {
                    (device, id)
                }
            })
            .collect();

        state.ui().say("Registering the OMI...");
        let request = RegisterRequest {
            name: config.omi_name.clone(),
            description: config.omi_description.clone(),
            root_device_name: root.device_name,
            block_devices,
        };
        let id = try_step!(
            state,
            client.register_omi(&request).context("failed to register OMI")
        );
        self.omi_id = Some(id.clone());

        try_step!(state, wait_for_omi(client.as_ref(), cancel, wait_config(&config), &id));
        state.put(OMI_ID, id);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        cleanup_omi(state, self.omi_id.take())
    }
}
