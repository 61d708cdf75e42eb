use std::borrow::Cow;

use anyhow::{Context, Result};

use super::driver::{CloneRequest, Driver};
use super::{CONFIG, DRIVER, HypervConfig, VM_NAME};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::steps::BUILD_DIR;
use crate::try_step;

/// Applies the hardware settings that differ from Hyper-V's defaults.
fn configure_hardware(driver: &dyn Driver, vm: &str, config: &HypervConfig) -> Result<()> {
    if config.cpus > 1 {
        driver
            .set_cpu_count(vm, config.cpus)
            .context("failed to set cpu count")?;
    }
    if config.enable_mac_spoofing {
        driver
            .set_mac_spoofing(vm, true)
            .context("failed to enable mac spoofing")?;
    }
    if config.enable_dynamic_memory {
        driver
            .set_dynamic_memory(vm, true)
            .context("failed to enable dynamic memory")?;
    }
    if config.enable_secure_boot {
        driver
            .set_secure_boot(vm, true)
            .context("failed to enable secure boot")?;
    }
    if config.enable_virtualization_extensions {
        driver
            .set_virtualization_extensions(vm, true)
            .context("failed to enable virtualization extensions")?;
    }
    Ok(())
}

/// Clones the source VM into the build directory.
///
/// The clone is unregistered and deleted on cleanup unless `keep_registered`.
#[derive(Debug, Default)]
pub struct StepCloneVm {
    vm_name: Option<String>,
}

impl Step for StepCloneVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("clone-vm")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let build_dir = try_step!(state, state.get(BUILD_DIR).cloned());

        state.ui().say("Cloning virtual machine...");
        let request = CloneRequest {
            vmcx_path: config.clone_from_vmcx_path.clone(),
            source_vm: config.clone_from_vm_name.clone(),
            snapshot_name: config.clone_from_snapshot_name.clone(),
            all_snapshots: config.clone_all_snapshots,
            vm_name: config.vm_name.clone(),
            path: build_dir,
            switch_name: config.switch_name.clone(),
            memory_mb: config.memory_mb,
        };
        try_step!(
            state,
            driver
                .clone_vm(&request)
                .context("failed to clone virtual machine")
        );
        self.vm_name = Some(config.vm_name.clone());
        state.put(VM_NAME, config.vm_name.clone());

        try_step!(state, configure_hardware(driver.as_ref(), &config.vm_name, &config));
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(vm) = self.vm_name.take() else {
            return Ok(());
        };
        let ui = state.ui();
        if state.get(CONFIG)?.keep_registered {
            ui.say("keep_registered set, skipping unregister of the virtual machine");
            return Ok(());
        }
        let driver = state.get(DRIVER)?.clone();
        ui.say("Unregistering and deleting virtual machine...");
        driver
            .delete_vm(&vm)
            .with_context(|| format!("failed to delete virtual machine {}, delete it manually", vm))
    }
}
