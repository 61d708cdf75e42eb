use std::borrow::Cow;
use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use super::client::{ServerRequest, wait_for_image, wait_for_server};
use super::{
    CLIENT, CONFIG, IMAGE_ID, IMAGE_NAME, SERVER_ID, SERVER_IP, SSH_PUBLIC_KEY, wait_config,
};
use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Loads the public key that the build server will trust.
#[derive(Debug, Default)]
pub struct StepCreateSshKey;

impl Step for StepCreateSshKey {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-ssh-key")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let config = try_step!(state, state.get(CONFIG).cloned());
        let Some(path) = config.ssh_public_key_file else {
            return StepAction::Continue;
        };
        let key = try_step!(
            state,
            fs::read_to_string(&path)
                .map_err(|e| PackstepError::io(format!("failed to read public key {}", path), e))
        );
        state.put(SSH_PUBLIC_KEY, key.trim().to_string());
        StepAction::Continue
    }
}

/// Creates the build server and waits until it is powered on.
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

        let appliance_id = try_step!(
            state,
            client
                .find_appliance(&config.source_image_name)
                .with_context(|| format!("failed to find image {}", config.source_image_name))
        );
        let data_center_id = match &config.data_center_name {
            Some(name) => Some(try_step!(
                state,
                client
                    .find_data_center(name)
                    .with_context(|| format!("failed to find data center {}", name))
            )),
            None => None,
        };

        ui.say("Creating server...");
        let request = ServerRequest {
            name: config.server_name.clone(),
            appliance_id,
            data_center_id,
            disk_size: config.disk_size,
            ssh_public_key: state.get_ok(SSH_PUBLIC_KEY).cloned(),
        };
        let id = try_step!(
            state,
            client.create_server(&request).context("failed to create server")
        );
        self.server_id = Some(id.clone());
        state.put(SERVER_ID, id.clone());

        let ip = try_step!(
            state,
            wait_for_server(client.as_ref(), cancel, wait_config(&config), &id)
        );
        info!(server_id = %id, %ip, "server is powered on");
        state.put(SERVER_IP, ip);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = self.server_id.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Removing server...");
        client
            .delete_server(&id)
            .with_context(|| format!("failed to delete server {}, delete it manually", id))
    }
}

/// Creates an image from the server. Removed again only when the build fails.
#[derive(Debug, Default)]
pub struct StepTakeSnapshot {
    image_id: Option<String>,
}

impl Step for StepTakeSnapshot {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("take-snapshot")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let server_id = try_step!(state, state.get(SERVER_ID).cloned());

        state.ui().say(&format!("Creating image {}...", config.image_name));
        let id = try_step!(
            state,
            client
                .create_image(&server_id, &config.image_name)
                .context("failed to create image")
        );
        self.image_id = Some(id.clone());

        try_step!(state, wait_for_image(client.as_ref(), cancel, wait_config(&config), &id));
        state.put(IMAGE_ID, id);
        state.put(IMAGE_NAME, config.image_name);
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
