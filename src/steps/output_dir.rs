use std::borrow::Cow;
use std::fs;

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, StateKey, Step, StepAction, halt};
use crate::try_step;

/// Directory receiving the build's deliverable files.
pub const OUTPUT_DIR: StateKey<Utf8PathBuf> = StateKey::new("output_dir");

/// Prepares the output directory.
///
/// An existing directory is an error unless `force` is set, in which case it
/// is deleted first. The directory is removed on cleanup only when the build
/// was cancelled or halted; on success it is the artifact.
#[derive(Debug)]
pub struct StepOutputDir {
    path: Utf8PathBuf,
    force: bool,
    created: bool,
}

impl StepOutputDir {
    pub fn new(path: Utf8PathBuf, force: bool) -> Self {
        Self {
            path,
            force,
            created: false,
        }
    }
}

impl Step for StepOutputDir {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("output-dir")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let ui = state.ui();
        if self.path.exists() {
            if !self.force {
                return halt(
                    state,
                    PackstepError::Validation(format!(
                        "output directory {} already exists; use force to overwrite it",
                        self.path
                    )),
                );
            }
            ui.say(&format!("Deleting previous output directory {}...", self.path));
            try_step!(
                state,
                fs::remove_dir_all(&self.path)
                    .map_err(|e| PackstepError::io(format!("failed to remove {}", self.path), e))
            );
        }

        try_step!(
            state,
            fs::create_dir_all(&self.path)
                .map_err(|e| PackstepError::io(format!("failed to create {}", self.path), e))
        );
        self.created = true;
        state.put(OUTPUT_DIR, self.path.clone());
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        if !self.created || !state.is_failed() {
            return Ok(());
        }
        state.ui().say("Deleting output directory...");
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackstepError::io(format!("failed to remove {}", self.path), e).into()),
        }
    }
}
