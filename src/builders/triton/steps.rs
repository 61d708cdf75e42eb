use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::client::{
    ImageRequest, MachineRequest, wait_for_image, wait_for_machine, wait_for_machine_gone,
};
use super::{CLIENT, CONFIG, IMAGE, MACHINE, MACHINE_IP, wait_config};
use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, Step, StepAction, halt};
use crate::try_step;

/// Creates the source machine and waits for it to run.
///
/// Cleanup deletes whatever machine is still recorded under [`MACHINE`], so
/// once [`StepDeleteMachine`] has removed it there is nothing left to do.
#[derive(Debug, Default)]
pub struct StepCreateSourceMachine;

impl Step for StepCreateSourceMachine {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-source-machine")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());

        state.ui().say("Creating source machine...");
        let request = MachineRequest {
            name: config.source_machine_name.clone(),
            package: config.source_machine_package.clone(),
            image: config.source_machine_image.clone(),
            networks: config.source_machine_networks.clone(),
            metadata: config.source_machine_metadata.clone(),
            tags: config.source_machine_tags.clone(),
        };
        let id = try_step!(
            state,
            client.create_machine(&request).context("failed to create source machine")
        );
        state.put(MACHINE, id.clone());

        state.ui().say("Waiting for source machine to become available...");
        let machine = try_step!(
            state,
            wait_for_machine(client.as_ref(), cancel, wait_config(&config), &id, "running")
        );
        let Some(ip) = machine.primary_ip else {
            return halt(
                state,
                PackstepError::unexpected_state(format!("machine {}", id), "running without an IP"),
            );
        };
        info!(machine = %id, %ip, "source machine is running");
        state.put(MACHINE_IP, ip);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = state.remove(MACHINE) else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say(&format!("Deleting source machine {}...", id));
        client
            .delete_machine(&id)
            .with_context(|| format!("failed to delete machine {}, delete it manually", id))
    }
}

#[derive(Debug, Default)]
pub struct StepStopMachine;

impl Step for StepStopMachine {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("stop-machine")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let id = try_step!(state, state.get(MACHINE).cloned());

        state.ui().say(&format!("Stopping source machine {}...", id));
        try_step!(state, client.stop_machine(&id).context("failed to stop source machine"));
        try_step!(
            state,
            wait_for_machine(client.as_ref(), cancel, wait_config(&config), &id, "stopped")
        );
        StepAction::Continue
    }
}

/// Creates the image. Deleted again only when the build fails.
#[derive(Debug, Default)]
pub struct StepCreateImageFromMachine {
    image_id: Option<String>,
}

impl Step for StepCreateImageFromMachine {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-image-from-machine")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let machine = try_step!(state, state.get(MACHINE).cloned());

        state.ui().say("Creating image from source machine...");
        let request = ImageRequest {
            name: config.image_name.clone(),
            version: config.image_version.clone(),
            description: config.image_description.clone(),
            tags: config.image_tags.clone(),
        };
        let id = try_step!(
            state,
            client
                .create_image_from_machine(&machine, &request)
                .context("failed to create image from machine")
        );
        self.image_id = Some(id.clone());

        try_step!(state, wait_for_image(client.as_ref(), cancel, wait_config(&config), &id));
        state.put(IMAGE, id);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        if !state.is_failed() {
            return Ok(());
        }
        let Some(id) = self.image_id.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say(&format!("Deleting image {}...", id));
        client
            .delete_image(&id)
            .with_context(|| format!("failed to delete image {}, delete it manually", id))
    }
}

/// Deletes the source machine as part of a successful build.
#[derive(Debug, Default)]
pub struct StepDeleteMachine;

impl Step for StepDeleteMachine {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("delete-machine")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let id = try_step!(state, state.get(MACHINE).cloned());

        state.ui().say(&format!("Deleting source machine {}...", id));
        try_step!(state, client.delete_machine(&id).context("failed to delete source machine"));
        if let Err(e) = wait_for_machine_gone(client.as_ref(), cancel, wait_config(&config), &id) {
            // The delete request was accepted, so cleanup must not repeat it.
            warn!(machine = %id, "machine deletion not confirmed: {:#}", e);
        }
        state.remove(MACHINE);
        StepAction::Continue
    }
}
