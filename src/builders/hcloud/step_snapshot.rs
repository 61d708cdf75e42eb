use std::borrow::Cow;

use anyhow::{Context, Result};

use super::client::wait_for_action;
use super::{CLIENT, CONFIG, SERVER_ID, SNAPSHOT_ID, SNAPSHOT_NAME, wait_config};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Snapshots the stopped server. The snapshot is the deliverable, so it is
/// only deleted when the build fails after it was created.
#[derive(Debug, Default)]
pub struct StepCreateSnapshot {
    image_id: Option<String>,
}

impl Step for StepCreateSnapshot {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-snapshot")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let server_id = try_step!(state, state.get(SERVER_ID).cloned());

        state.ui().say(&format!("Creating snapshot {}...", config.snapshot_name));
        let created = try_step!(
            state,
            client
                .create_image(&server_id, &config.snapshot_name, &config.snapshot_labels)
                .context("failed to create snapshot")
        );
        self.image_id = Some(created.id.clone());

        try_step!(
            state,
            wait_for_action(client.as_ref(), cancel, wait_config(&config), &created.action_id)
                .context("failed to wait for snapshot")
        );

        state.put(SNAPSHOT_ID, created.id);
        state.put(SNAPSHOT_NAME, config.snapshot_name);
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
        state.ui().say(&format!("Deleting snapshot {}...", id));
        client
            .delete_image(&id)
            .with_context(|| format!("failed to delete snapshot {}, delete it manually", id))
    }
}
