use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use super::{CONNECTOR, CommunicatorConfig, Connector, Endpoint, SESSION, SshConfig};
use crate::error::PackstepError;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};
use crate::multistep::{CancelToken, StateBag, Step, StepAction, halt};
use crate::try_step;

/// Resolves the address of the created machine from the state bag.
pub type HostFn = fn(&StateBag) -> Result<String>;

/// Connects the communicator to the machine.
///
/// A no-op for the `none` communicator. For SSH, attempts are repeated every
/// `interval_secs` until one succeeds or `timeout_secs` runs out; the session
/// is stored under [`SESSION`] and closed on cleanup.
pub struct StepConnect {
    config: CommunicatorConfig,
    host: HostFn,
}

impl StepConnect {
    pub fn new(config: CommunicatorConfig, host: HostFn) -> Self {
        Self { config, host }
    }

    fn endpoint(&self, ssh: &SshConfig, state: &StateBag) -> Result<Endpoint> {
        let host = match &ssh.host {
            Some(host) => host.clone(),
            None => (self.host)(state)?,
        };
        Ok(Endpoint {
            host,
            port: ssh.port,
            username: ssh.username.clone(),
            private_key_file: ssh.private_key_file.clone(),
        })
    }
}

fn is_timeout(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<PackstepError>(), Some(PackstepError::Timeout { .. }))
}

impl Step for StepConnect {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("connect")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let ssh = match &self.config {
            CommunicatorConfig::None => {
                info!("communicator disabled, skipping connect");
                return StepAction::Continue;
            }
            CommunicatorConfig::Ssh(ssh) => ssh,
        };

        let connector: Option<Arc<dyn Connector>> = state.get_ok(CONNECTOR).cloned();
        let Some(connector) = connector else {
            return halt(
                state,
                PackstepError::Config(
                    "the ssh communicator needs a connector, but none was provided".to_string(),
                ),
            );
        };
        let endpoint = try_step!(state, self.endpoint(ssh, state));

        let ui = state.ui();
        ui.say(&format!("Waiting for SSH to become available on {}...", endpoint));

        let wait = WaitConfig::new(ssh.interval(), ssh.timeout());
        let mut attempt = 0u32;
        let mut last_error = None;
        let outcome = wait_for("SSH to become available", cancel, wait, || {
            attempt += 1;
            match connector.connect(&endpoint, cancel) {
                Ok(session) => Ok(Poll::Ready(session)),
                Err(e) => {
                    debug!(attempt, "ssh connection failed: {:#}", e);
                    last_error = Some(e);
                    Ok(Poll::Pending)
                }
            }
        });
        let session = try_step!(
            state,
            outcome.map_err(|e| match last_error {
                Some(last) if is_timeout(&e) => e.context(format!(
                    "SSH never became available on {} (last error: {:#})",
                    endpoint, last
                )),
                _ => e,
            })
        );

        ui.say("Connected to SSH!");
        state.put(SESSION, session);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        if let Some(mut session) = state.remove(SESSION) {
            debug!("closing communicator session");
            session.close()?;
        }
        Ok(())
    }
}
