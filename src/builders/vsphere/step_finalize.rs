use std::borrow::Cow;

use anyhow::Context;

use super::{CONFIG, DRIVER, VM};
use crate::multistep::{CancelToken, StateBag, Step, StepAction};
use crate::try_step;

#[derive(Debug, Default)]
pub struct StepCreateSnapshot;

impl Step for StepCreateSnapshot {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-snapshot")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let config = try_step!(state, state.get(CONFIG).cloned());
        let vm = try_step!(state, state.get(VM).cloned());

        state.ui().say(&format!("Creating snapshot {}...", config.snapshot_name));
        try_step!(
            state,
            driver
                .create_snapshot(&vm, &config.snapshot_name)
                .context("failed to create snapshot")
        );
        StepAction::Continue
    }
}

#[derive(Debug, Default)]
pub struct StepConvertToTemplate;

impl Step for StepConvertToTemplate {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("convert-to-template")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let driver = try_step!(state, state.get(DRIVER).cloned());
        let vm = try_step!(state, state.get(VM).cloned());

        state.ui().say("Converting virtual machine to template...");
        try_step!(
            state,
            driver.convert_to_template(&vm).context("failed to convert to template")
        );
        StepAction::Continue
    }
}
