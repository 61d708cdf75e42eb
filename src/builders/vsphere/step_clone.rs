use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::warn;

use super::driver::{CloneSpec, HardwareSpec};
use super::{CONFIG, DRIVER, VM};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

/// Clones the template. The clone is the deliverable and is destroyed only
/// when the build fails.
#[derive(Debug, Default)]
pub struct StepCloneVm {
    vm: Option<String>,
}

impl Step for StepCloneVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("clone-vm")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());

        state.ui().say(&format!("Cloning {} to {}...", config.template, config.vm_name));
        let spec = CloneSpec {
            template: config.template.clone(),
            name: config.vm_name.clone(),
            folder: config.folder.clone(),
            cluster: config.cluster.clone(),
            host: config.host.clone(),
            resource_pool: config.resource_pool.clone(),
            datastore: config.datastore.clone(),
            linked_clone: config.linked_clone,
            network: config.network.clone(),
            mac_address: config.mac_address.clone(),
            notes: config.notes.clone(),
        };
        let vm = try_step!(state, driver.clone_vm(&spec).context("failed to clone template"));
        self.vm = Some(vm.clone());
        state.put(VM, vm.clone());

        if let Some(size) = config.disk_size_mb {
            state.ui().say(&format!("Resizing disk to {} MB...", size));
            try_step!(state, driver.resize_disk(&vm, size).context("failed to resize disk"));
        }
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        if !state.is_failed() {
            return Ok(());
        }
        let Some(vm) = self.vm.take() else {
            return Ok(());
        };
        let driver = state.get(DRIVER)?.clone();
        let ui = state.ui();
        match driver.is_powered_on(&vm) {
            Ok(true) => {
                ui.say("Powering off virtual machine...");
                driver.power_off(&vm).context("failed to power off virtual machine")?;
            }
            Ok(false) => {}
            Err(e) => warn!(%vm, "could not read power state: {:#}", e),
        }
        ui.say("Destroying virtual machine...");
        driver
            .destroy(&vm)
            .with_context(|| format!("failed to destroy virtual machine {}, delete it manually", vm))
    }
}

/// Applies the CPU and memory settings to the clone.
#[derive(Debug, Default)]
pub struct StepConfigureHardware;

impl Step for StepConfigureHardware {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("configure-hardware")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm = try_step!(state, state.get(VM).cloned());

        state.ui().say("Customizing hardware...");
        let hardware = HardwareSpec {
            cpus: config.cpus,
            ram_mb: config.ram_mb,
        };
        try_step!(
            state,
            driver.configure(&vm, &hardware).context("failed to configure hardware")
        );
        StepAction::Continue
    }
}
