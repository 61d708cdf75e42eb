use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::info;

use super::client::{VmRequest, wait_for_vm};
use super::{
    CLIENT, CONFIG, KEYPAIR_NAME, SECURITY_GROUP_IDS, SOURCE_OMI, VM, VM_ID, wait_config,
};
use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, Step, StepAction, halt};
use crate::try_step;

const EXPECTED_ROOT_DEVICE: &str = "bsu";

/// Launches the build VM from the source OMI and waits for it to run.
#[derive(Debug, Default)]
pub struct StepRunSourceVm {
    vm_id: Option<String>,
}

impl Step for StepRunSourceVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("run-source-vm")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let omi = try_step!(state, state.get(SOURCE_OMI).cloned());

        if omi.root_device_type != EXPECTED_ROOT_DEVICE {
            return halt(
                state,
                PackstepError::Validation(format!(
                    "the source OMI has an invalid root device type: expected '{}', got '{}'",
                    EXPECTED_ROOT_DEVICE, omi.root_device_type
                )),
            );
        }

        let keypair_name = config
            .ssh_keypair_name
            .clone()
            .or_else(|| state.get_ok(KEYPAIR_NAME).cloned());
        let security_group_ids = state
            .get_ok(SECURITY_GROUP_IDS)
            .cloned()
            .unwrap_or_else(|| config.security_group_ids.clone());

        state.ui().say("Launching a source OUTSCALE vm...");
        let request = VmRequest {
            omi_id: omi.id,
            vm_type: config.vm_type.clone(),
            keypair_name,
            security_group_ids,
            subregion_name: config.subregion_name.clone(),
            subnet_id: config.subnet_id.clone(),
            user_data: config.user_data.clone(),
            block_devices: config.launch_block_device_mappings.clone(),
        };
        let id = try_step!(
            state,
            client.create_vm(&request).context("failed to launch source vm")
        );
        self.vm_id = Some(id.clone());
        state.put(VM_ID, id.clone());
        state.ui().message(&format!("Vm ID: {}", id));

        state.ui().say(&format!("Waiting for vm ({}) to become ready...", id));
        try_step!(
            state,
            wait_for_vm(client.as_ref(), cancel, wait_config(&config), &id, "running")
        );
        let vm = try_step!(state, client.read_vm(&id).context("failed to read source vm"));
        info!(vm = %id, public_ip = ?vm.public_ip, private_ip = ?vm.private_ip, "vm is running");
        state.put(VM, vm);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = self.vm_id.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Terminating the source OUTSCALE vm...");
        client
            .delete_vm(&id)
            .with_context(|| format!("failed to terminate vm {}, delete it manually", id))
    }
}

/// Stops the VM so its volumes are consistent.
#[derive(Debug, Default)]
pub struct StepStopVm;

impl Step for StepStopVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("stop-vm")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let id = try_step!(state, state.get(VM_ID).cloned());

        state.ui().say("Stopping the source vm...");
        try_step!(state, client.stop_vm(&id).context("failed to stop vm"));
        try_step!(
            state,
            wait_for_vm(client.as_ref(), cancel, wait_config(&config), &id, "stopped")
        );
        StepAction::Continue
    }
}
