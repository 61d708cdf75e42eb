//! The builder contract shared by every provider.
//!
//! A builder validates its configuration (`prepare`, inherent on each builder
//! because the config types differ), assembles a provider-specific step list,
//! runs it through a [`Runner`](crate::multistep::Runner) and translates the
//! final state bag into an [`Artifact`] or an error.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::error::PackstepError;
use crate::multistep::{CancelToken, RunReport, Runner, StateBag, Step};
use crate::provisioners::Hook;
use crate::ui::Ui;

/// A provider builder.
pub trait Builder: Send + Sync {
    /// Configuration `type` this builder is registered under.
    fn name(&self) -> &'static str;

    /// Runs the build.
    ///
    /// Returns `Ok(None)` when the build succeeded but was configured not to
    /// produce an artifact.
    fn run(&self, ui: Arc<dyn Ui>, hook: Arc<dyn Hook>) -> Result<Option<Box<dyn Artifact>>>;

    /// Cancels a running build. A no-op when no build is running.
    fn cancel(&self);
}

/// Slot holding the cancellation token of the build a builder is driving.
///
/// Empty before and after a build, so cancelling then does nothing. A build
/// claims the slot with [`begin`](Self::begin) before any setup work, so a
/// cancel issued while the builder is still preparing is not lost.
#[derive(Debug, Default)]
pub struct RunnerHandle {
    active: Mutex<Option<CancelToken>>,
}

impl RunnerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a build as running and returns its guard.
    ///
    /// The slot is cleared when the guard is dropped, including on early
    /// returns from setup.
    pub fn begin(&self) -> ActiveRun<'_> {
        let token = CancelToken::new();
        *self.slot() = Some(token.clone());
        ActiveRun {
            handle: self,
            token,
        }
    }

    pub fn cancel(&self) {
        match self.slot().as_ref() {
            Some(token) => token.cancel(),
            None => debug!("cancel requested but no build is running"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A build in progress, cancellable through its [`RunnerHandle`].
#[derive(Debug)]
pub struct ActiveRun<'a> {
    handle: &'a RunnerHandle,
    token: CancelToken,
}

impl ActiveRun<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Runs `steps` to completion under this build's token.
    ///
    /// A cancel raised during setup makes the runner skip every step.
    /// Cleanup failures are surfaced to the operator as a list of resources
    /// that may need manual deletion; they never become the build error.
    pub fn run(self, steps: Vec<Box<dyn Step>>, state: &mut StateBag) -> RunReport {
        let report = Runner::with_token(steps, self.token.clone()).run(state);

        if !report.cleanup_failures.is_empty() {
            let steps: Vec<&str> = report
                .cleanup_failures
                .iter()
                .map(|failure| failure.step.as_str())
                .collect();
            warn!(steps = ?steps, "cleanup finished with errors");
            state.ui().error(&format!(
                "Some resources could not be cleaned up and may need to be deleted manually \
                (failed cleanup in: {})",
                steps.join(", ")
            ));
        }
        report
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.handle.slot() = None;
    }
}

/// Translates the final state of a run into the builder's result.
///
/// In order: the recorded error is returned verbatim; otherwise a cancelled
/// or halted run yields [`PackstepError::BuildCancelled`] or
/// [`PackstepError::BuildHalted`]; otherwise `produce` builds the artifact
/// from the output keys, returning `Ok(None)` when they are absent.
pub fn finish<F>(state: &mut StateBag, produce: F) -> Result<Option<Box<dyn Artifact>>>
where
    F: FnOnce(&mut StateBag) -> Result<Option<Box<dyn Artifact>>>,
{
    if let Some(error) = state.take_error() {
        return Err(error);
    }
    if state.is_cancelled() {
        return Err(PackstepError::BuildCancelled.into());
    }
    if state.is_halted() {
        return Err(PackstepError::BuildHalted.into());
    }
    produce(state)
}
