use std::borrow::Cow;

use anyhow::{Context, Result};

use super::{CLIENT, CONFIG, SSH_KEY_ID};
use crate::builders::unique_name;
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Uploads the configured public key as a temporary, build-scoped key.
#[derive(Debug, Default)]
pub struct StepCreateSshKey {
    key_id: Option<String>,
}

impl Step for StepCreateSshKey {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-ssh-key")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let ui = state.ui();

        let Some(public_key) = config.ssh_public_key else {
            ui.message("No public key configured, skipping temporary SSH key");
            return StepAction::Continue;
        };

        ui.say("Uploading temporary SSH key...");
        let name = unique_name("packer");
        let id = try_step!(
            state,
            client
                .create_ssh_key(&name, &public_key)
                .context("failed to create temporary ssh key")
        );
        ui.message(&format!("Created SSH key {} ({})", name, id));

        self.key_id = Some(id.clone());
        state.put(SSH_KEY_ID, id);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = self.key_id.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Deleting temporary SSH key...");
        client
            .delete_ssh_key(&id)
            .with_context(|| format!("failed to delete ssh key {}, delete it manually", id))
    }
}
