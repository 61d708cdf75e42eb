use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::debug;

use super::{CONFIG, DRIVER, VM_NAME};
use crate::communicator::SESSION;
use crate::multistep::wait::{DEFAULT_POLL_INTERVAL, Poll, WaitConfig, wait_for};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

const GUEST_SERVICE_INTERFACE: &str = "Guest Service Interface";

/// Enables the guest service interface used for file copies from the host.
#[derive(Debug, Default)]
pub struct StepEnableIntegrationService;

impl Step for StepEnableIntegrationService {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("enable-integration-service")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM_NAME).cloned());
        state.ui().say("Enabling integration service...");
        try_step!(
            state,
            driver
                .enable_integration_service(&vm, GUEST_SERVICE_INTERFACE)
                .context("failed to enable integration service")
        );
        StepAction::Continue
    }
}

/// Tags the VM's network adapter with a VLAN.
#[derive(Debug)]
pub struct StepConfigureVlan {
    vlan_id: u16,
}

impl StepConfigureVlan {
    pub fn new(vlan_id: u16) -> Self {
        Self { vlan_id }
    }
}

impl Step for StepConfigureVlan {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("configure-vlan")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM_NAME).cloned());
        state.ui().say(&format!("Configuring VLAN {}...", self.vlan_id));
        try_step!(
            state,
            driver
                .set_vlan_id(&vm, self.vlan_id)
                .context("failed to set vlan id")
        );
        StepAction::Continue
    }
}

/// Starts the VM. Cleanup stops it if it is still running.
#[derive(Debug, Default)]
pub struct StepStartVm {
    started: Option<String>,
}

impl Step for StepStartVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("start-vm")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM_NAME).cloned());
        state.ui().say("Starting the virtual machine...");
        try_step!(state, driver.start(&vm).context("failed to start virtual machine"));
        self.started = Some(vm);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(vm) = self.started.take() else {
            return Ok(());
        };
        let driver = state.get(DRIVER)?.clone();
        if driver.is_running(&vm)? {
            state.ui().say("Stopping the virtual machine...");
            driver
                .stop(&vm)
                .with_context(|| format!("failed to stop virtual machine {}", vm))?;
        }
        Ok(())
    }
}

/// Shuts the VM down and waits until it is off.
///
/// Uses `shutdown_command` over the communicator when both are available,
/// otherwise asks Hyper-V to stop the VM.
#[derive(Debug, Default)]
pub struct StepShutdown;

impl Step for StepShutdown {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("shutdown")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm = try_step!(state, state.get(VM_NAME).cloned());
        let ui = state.ui();

        let graceful = match (&config.shutdown_command, state.get_mut(SESSION).ok()) {
            (Some(command), Some(session)) => {
                ui.say("Gracefully halting virtual machine...");
                Some(session.run(command).map(|code| {
                    debug!(code, "shutdown command finished");
                }))
            }
            _ => None,
        };
        match graceful {
            Some(result) => try_step!(state, result.context("failed to send shutdown command")),
            None => {
                ui.say("Forcibly halting virtual machine...");
                try_step!(state, driver.stop(&vm).context("failed to stop virtual machine"));
            }
        }

        ui.message("Waiting for the virtual machine to power off...");
        let wait = WaitConfig::new(DEFAULT_POLL_INTERVAL, config.shutdown_timeout());
        try_step!(
            state,
            wait_for("virtual machine to power off", cancel, wait, || {
                Ok(if driver.is_off(&vm)? { Poll::Ready(()) } else { Poll::Pending })
            })
        );
        ui.message("Virtual machine is off");
        StepAction::Continue
    }
}
