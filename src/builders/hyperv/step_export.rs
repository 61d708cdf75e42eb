use std::borrow::Cow;

use anyhow::Context;

use super::{DRIVER, EXPORT_DIR, VM_NAME};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::steps::{BUILD_DIR, OUTPUT_DIR};
use crate::try_step;

/// Optimizes the VM's virtual disks.
#[derive(Debug, Default)]
pub struct StepCompactDisk;

impl Step for StepCompactDisk {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("compact-disk")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let build_dir = try_step!(state, state.get(BUILD_DIR).cloned());
        state.ui().say("Compacting disks...");
        try_step!(
            state,
            driver
                .compact_disks(&build_dir.join("Virtual Hard Disks"))
                .context("failed to compact disks")
        );
        StepAction::Continue
    }
}

/// Exports the VM into the build directory.
#[derive(Debug, Default)]
pub struct StepExportVm;

impl Step for StepExportVm {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("export-vm")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM_NAME).cloned());
        let build_dir = try_step!(state, state.get(BUILD_DIR).cloned());
        let export_dir = build_dir.join("export");

        state.ui().say("Exporting virtual machine...");
        try_step!(
            state,
            driver
                .export_vm(&vm, &export_dir)
                .context("failed to export virtual machine")
        );
        state.put(EXPORT_DIR, export_dir);
        StepAction::Continue
    }
}

/// Moves the exported VM into the output directory.
#[derive(Debug, Default)]
pub struct StepCollateArtifacts;

impl Step for StepCollateArtifacts {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("collate-artifacts")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let export_dir = try_step!(state, state.get(EXPORT_DIR).cloned());
        let output_dir = try_step!(state, state.get(OUTPUT_DIR).cloned());

        state.ui().say("Collating build artifacts...");
        try_step!(
            state,
            driver
                .copy_exported_vm(&export_dir, &output_dir)
                .context("failed to copy exported virtual machine")
        );
        StepAction::Continue
    }
}
