use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::debug;

use super::{CONFIG, DRIVER, VM, VM_IP};
use crate::communicator::SESSION;
use crate::multistep::wait::{Poll, WaitConfig, wait_for};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Powers the VM on. Cleanup powers it off again if it is still running.
#[derive(Debug, Default)]
pub struct StepPowerOn {
    vm: Option<String>,
}

impl Step for StepPowerOn {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("power-on")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM).cloned());

        state.ui().say("Powering on virtual machine...");
        try_step!(state, driver.power_on(&vm).context("failed to power on virtual machine"));
        self.vm = Some(vm);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(vm) = self.vm.take() else {
            return Ok(());
        };
        let driver = state.get(DRIVER)?.clone();
        if driver.is_powered_on(&vm)? {
            state.ui().say("Powering off virtual machine...");
            driver.power_off(&vm).context("failed to power off virtual machine")?;
        }
        Ok(())
    }
}

/// Waits until the guest tools report an IP address.
#[derive(Debug, Default)]
pub struct StepWaitForIp;

impl Step for StepWaitForIp {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("wait-for-ip")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm = try_step!(state, state.get(VM).cloned());

        state.ui().say("Waiting for IP...");
        let wait = WaitConfig::new(config.poll_interval(), config.ip_wait_timeout());
        let ip = try_step!(
            state,
            wait_for("virtual machine IP", cancel, wait, || {
                Ok(match driver.guest_ip(&vm)? {
                    Some(ip) => Poll::Ready(ip),
                    None => Poll::Pending,
                })
            })
        );
        state.ui().say(&format!("IP address: {}", ip));
        state.put(VM_IP, ip);
        StepAction::Continue
    }
}

/// Shuts the guest down and waits for power off.
#[derive(Debug, Default)]
pub struct StepShutdown;

impl Step for StepShutdown {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("shutdown")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm = try_step!(state, state.get(VM).cloned());
        let ui = state.ui();

        let sent = match (&config.shutdown_command, state.get_mut(SESSION).ok()) {
            (Some(command), Some(session)) => {
                ui.say("Executing shutdown command...");
                Some(session.run(command).map(|code| debug!(code, "shutdown command finished")))
            }
            _ => None,
        };
        match sent {
            Some(result) => try_step!(state, result.context("failed to send shutdown command")),
            None => {
                ui.say("Shutting down the guest...");
                try_step!(state, driver.shutdown_guest(&vm).context("failed to shut down guest"));
            }
        }

        ui.message("Waiting for the virtual machine to power off...");
        let wait = WaitConfig::new(config.poll_interval(), config.shutdown_timeout());
        try_step!(
            state,
            wait_for("virtual machine to power off", cancel, wait, || {
                Ok(if driver.is_powered_on(&vm)? { Poll::Pending } else { Poll::Ready(()) })
            })
        );
        ui.say("Virtual machine is powered off");
        StepAction::Continue
    }
}
