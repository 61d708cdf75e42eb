use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::info;

use super::client::{ServerRequest, wait_for_action};
use super::{CLIENT, CONFIG, SERVER_ID, SERVER_IP, SSH_KEY_ID, wait_config};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Key names and IDs the server should trust: the configured ones plus the
/// temporary key, if one was uploaded.
fn server_ssh_keys(state: &StateBag, configured: &[String]) -> Vec<String> {
    let mut keys = configured.to_vec();
    if let Some(id) = state.get_ok(SSH_KEY_ID) {
        keys.push(id.clone());
    }
    keys
}

/// Creates the build server and waits for it to boot. The server is always
/// deleted on cleanup.
#[derive(Debug, Default)]
pub struct StepCreateServer {
    server_id: Option<String>,
}

impl Step for StepCreateServer {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-server")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let ui = state.ui();

        ui.say("Creating server...");
        let request = ServerRequest {
            name: config.server_name.clone(),
            server_type: config.server_type.clone(),
            image: config.image.clone(),
            location: config.location.clone(),
            user_data: config.user_data.clone(),
            ssh_keys: server_ssh_keys(state, &config.ssh_keys),
        };
        let created = try_step!(
            state,
            client.create_server(&request).context("failed to create server")
        );

        // Recorded before waiting so a failed boot still gets the server deleted.
        self.server_id = Some(created.id.clone());
        state.put(SERVER_ID, created.id.clone());
        state.put(SERVER_IP, created.ipv4.clone());

        try_step!(
            state,
            wait_for_action(client.as_ref(), cancel, wait_config(&config), &created.action_id)
                .context("failed to wait for server to start")
        );
        info!(server_id = %created.id, ip = %created.ipv4, "server is running");
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = self.server_id.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Destroying server...");
        client
            .delete_server(&id)
            .with_context(|| format!("failed to delete server {}, delete it manually", id))
    }
}

/// Boots the server into a rescue system.
#[derive(Debug, Default)]
pub struct StepRescue;

impl Step for StepRescue {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("rescue")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let server_id = try_step!(state, state.get(SERVER_ID).cloned());
        let Some(rescue) = config.rescue.as_deref() else {
            return StepAction::Continue;
        };
        let ui = state.ui();
        let wait = wait_config(&config);

        ui.say(&format!("Enabling rescue mode ({})...", rescue));
        let keys = server_ssh_keys(state, &config.ssh_keys);
        let action = try_step!(
            state,
            client
                .enable_rescue(&server_id, rescue, &keys)
                .context("failed to enable rescue mode")
        );
        try_step!(state, wait_for_action(client.as_ref(), cancel, wait, &action));

        ui.say("Rebooting into rescue mode...");
        let action = try_step!(
            state,
            client.reboot_server(&server_id).context("failed to reboot server")
        );
        try_step!(state, wait_for_action(client.as_ref(), cancel, wait, &action));
        StepAction::Continue
    }
}

/// Shuts the server down so the snapshot is consistent.
#[derive(Debug, Default)]
pub struct StepShutdown;

impl Step for StepShutdown {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("shutdown")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let server_id = try_step!(state, state.get(SERVER_ID).cloned());

        state.ui().say("Shutting down server...");
        let action = try_step!(
            state,
            client.shutdown_server(&server_id).context("failed to shut down server")
        );
        try_step!(
            state,
            wait_for_action(client.as_ref(), cancel, wait_config(&config), &action)
                .context("failed to wait for server shutdown")
        );
        StepAction::Continue
    }
}
