use std::borrow::Cow;

use anyhow::{Context, Result};

use super::client::{OmiRequest, OscClient, wait_for_omi};
use super::{CLIENT, CONFIG, OMI_ID, SNAPSHOTS, VM_ID, wait_config};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Deregisters an OMI produced by a failed build.
pub(super) fn cleanup_omi(state: &mut StateBag, omi_id: Option<String>) -> Result<()> {
    if !state.is_failed() {
        return Ok(());
    }
    let Some(id) = omi_id else {
        return Ok(());
    };
    let client: std::sync::Arc<dyn OscClient> = state.get(CLIENT)?.clone();
    state.ui().say(&format!("Deregistering the OMI {} because of cancellation or error...", id));
    client
        .delete_omi(&id)
        .with_context(|| format!("failed to deregister OMI {}, delete it manually", id))
}

/// Creates the OMI from the stopped VM.
#[derive(Debug, Default)]
pub struct StepCreateOmi {
    omi_id: Option<String>,
}

impl Step for StepCreateOmi {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-omi")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm_id = try_step!(state, state.get(VM_ID).cloned());

        state.ui().say(&format!("Creating OMI {} from vm {}", config.omi_name, vm_id));
        let request = OmiRequest {
            name: config.omi_name.clone(),
            description: config.omi_description.clone(),
        };
        let id = try_step!(
            state,
            client.create_omi(&vm_id, &request).context("failed to create OMI")
        );
        self.omi_id = Some(id.clone());

        state.ui().say("Waiting for OMI to become ready...");
        try_step!(state, wait_for_omi(client.as_ref(), cancel, wait_config(&config), &id));
        state.put(OMI_ID, id);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        cleanup_omi(state, self.omi_id.take())
    }
}

/// Shares the OMI with the configured accounts and groups.
#[derive(Debug, Default)]
pub struct StepUpdateOmiAttributes;

impl Step for StepUpdateOmiAttributes {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("update-omi-attributes")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let omi_id = try_step!(state, state.get(OMI_ID).cloned());

        state.ui().say("Updating OMI permissions...");
        try_step!(
            state,
            client
                .update_omi_permissions(&omi_id, &config.omi_account_ids, &config.omi_groups)
                .context("failed to update OMI permissions")
        );
        StepAction::Continue
    }
}

/// Tags the OMI and its snapshots.
#[derive(Debug, Default)]
pub struct StepCreateTags;

impl Step for StepCreateTags {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-tags")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let omi_id = try_step!(state, state.get(OMI_ID).cloned());

        if !config.tags.is_empty() {
            state.ui().say(&format!("Adding tags to OMI ({})...", omi_id));
            try_step!(
                state,
                client
                    .create_tags(std::slice::from_ref(&omi_id), &config.tags)
                    .context("failed to tag OMI")
            );
        }
        let snapshot_ids: Vec<String> = state
            .get_ok(SNAPSHOTS)
            .map(|snapshots| snapshots.values().cloned().collect())
            .unwrap_or_default();
        if !config.snapshot_tags.is_empty() && !snapshot_ids.is_empty() {
            state.ui().say("Adding tags to snapshots...");
            try_step!(
                state,
                client
                    .create_tags(&snapshot_ids, &config.snapshot_tags)
                    .context("failed to tag snapshots")
            );
        }
        StepAction::Continue
    }
}
