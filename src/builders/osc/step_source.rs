use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::info;

use super::client::OmiQuery;
use super::{CLIENT, CONFIG, KEYPAIR_NAME, PRIVATE_KEY, SECURITY_GROUP_IDS, SOURCE_OMI};
use crate::builders::unique_name;
use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, Step, StepAction, halt};
use crate::try_step;

/// Resolves the source OMI by ID or filter.
#[derive(Debug, Default)]
pub struct StepSourceOmiInfo;

impl Step for StepSourceOmiInfo {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("source-omi-info")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());

        let query = match (config.source_omi, config.source_omi_filter) {
            (Some(id), _) => OmiQuery::Id(id),
            (None, Some(filter)) => OmiQuery::Filter(filter),
            (None, None) => {
                return halt(
                    state,
                    PackstepError::Validation("source_omi or source_omi_filter is required".into()),
                );
            }
        };
        state.ui().say("Inspecting the source OMI...");
        let found = try_step!(
            state,
            client.find_omi(&query).context("failed to look up the source OMI")
        );
        let Some(omi) = found else {
            return halt(
                state,
                PackstepError::Validation(format!("no source OMI matches {:?}", query)),
            );
        };
        info!(omi = %omi.id, name = %omi.name, "found source OMI");
        state.put(SOURCE_OMI, omi);
        StepAction::Continue
    }
}

/// Creates a temporary key pair for the build VM.
#[derive(Debug, Default)]
pub struct StepKeyPair {
    created: Option<String>,
}

impl Step for StepKeyPair {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("key-pair")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let name = config.temporary_key_pair_name;

        state.ui().say(&format!("Creating temporary key pair: {}", name));
        let private_key = try_step!(
            state,
            client.create_keypair(&name).context("failed to create temporary key pair")
        );
        self.created = Some(name.clone());
        state.put(KEYPAIR_NAME, name);
        state.put(PRIVATE_KEY, private_key);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(name) = self.created.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Deleting temporary key pair...");
        client
            .delete_keypair(&name)
            .with_context(|| format!("failed to delete key pair {}, delete it manually", name))
    }
}

/// Creates a temporary security group that lets the communicator in.
#[derive(Debug)]
pub struct StepSecurityGroup {
    port: u16,
    created: Option<String>,
}

impl StepSecurityGroup {
    pub fn new(port: u16) -> Self {
        Self { port, created: None }
    }
}

impl Step for StepSecurityGroup {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("security-group")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let client = try_step!(state, state.get(CLIENT).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let name = unique_name("packer");

        state.ui().say("Creating temporary security group for this instance...");
        let id = try_step!(
            state,
            client
                .create_security_group(
                    &name,
                    &config.temporary_security_group_source_cidr,
                    self.port
                )
                .context("failed to create temporary security group")
        );
        self.created = Some(id.clone());
        state.put(SECURITY_GROUP_IDS, vec![id]);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(id) = self.created.take() else {
            return Ok(());
        };
        let client = state.get(CLIENT)?.clone();
        state.ui().say("Deleting temporary security group...");
        client.delete_security_group(&id).with_context(|| {
            format!("failed to delete security group {}, delete it manually", id)
        })
    }
}
