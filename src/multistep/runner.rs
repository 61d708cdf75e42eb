//! Sequential step executor with reverse-order cleanup.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use super::{CancelToken, StateBag, Step, StepAction};
use crate::error::PackstepError;
use crate::executor::panic_message;

/// A cleanup that failed. Reported to the operator, never fatal.
#[derive(Debug)]
pub struct CleanupFailure {
    pub step: String,
    pub error: anyhow::Error,
}

/// What a run did, in order.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Steps whose `run` was entered, in execution order.
    pub executed: Vec<String>,
    /// Steps whose `cleanup` was invoked, in cleanup order.
    pub cleaned: Vec<String>,
    /// Cleanup errors, in cleanup order.
    pub cleanup_failures: Vec<CleanupFailure>,
}

/// Drives an ordered list of steps against one state bag.
///
/// The runner is consumed by [`run`](Self::run), so a step list executes at
/// most once. Cancellation goes through a [`CancelToken`] obtained before the
/// run starts.
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    cancel: CancelToken,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self::with_token(steps, CancelToken::new())
    }

    /// Creates a runner driven by an existing token. A token cancelled
    /// before [`run`](Self::run) makes the run skip every step.
    pub fn with_token(steps: Vec<Box<dyn Step>>, cancel: CancelToken) -> Self {
        Self { steps, cancel }
    }

    /// Handle that cancels this runner from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Raises the cooperative cancellation signal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().into_owned()).collect()
    }

    /// Runs the steps in order, then cleans up every step that ran in
    /// reverse order.
    ///
    /// Forward execution stops when a step halts, panics, or the token is
    /// cancelled. Outcomes are recorded in `state`: the error, and the
    /// `halted`/`cancelled` flags.
    pub fn run(self, state: &mut StateBag) -> RunReport {
        let Runner { mut steps, cancel } = self;
        let total = steps.len();
        let mut executed: Vec<usize> = Vec::with_capacity(total);
        let mut report = RunReport::default();

        for (index, step) in steps.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                warn!("cancelled before step {}/{}", index + 1, total);
                break;
            }

            // Recorded before the call so a step that fails midway still
            // gets its cleanup.
            executed.push(index);
            let name = step.name().into_owned();
            report.executed.push(name.clone());
            info!("running step {}/{}: {}", index + 1, total, name);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.run(&cancel, state)));
            match outcome {
                Ok(StepAction::Continue) => {}
                Ok(StepAction::Halt) => {
                    if state.error().is_none() {
                        warn!(step = %name, "step halted without recording an error");
                        state.set_error(PackstepError::StepHalted { step: name.clone() }.into());
                    }
                    warn!(step = %name, "step halted, stopping build");
                    state.mark_halted();
                    break;
                }
                Err(payload) => {
                    let message = panic_message(&*payload).to_string();
                    error!(step = %name, panic = %message, "step panicked");
                    state.set_error(PackstepError::StepPanicked { step: name, message }.into());
                    state.mark_halted();
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            warn!("build cancelled");
            state.mark_cancelled();
        }

        for &index in executed.iter().rev() {
            let step = &mut steps[index];
            let name = step.name().into_owned();
            debug!("cleaning up step: {}", name);

            let failure = match panic::catch_unwind(AssertUnwindSafe(|| step.cleanup(state))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(anyhow::anyhow!(
                    "cleanup panicked: {}",
                    panic_message(&*payload)
                )),
            };

            if let Some(error) = failure {
                error!(step = %name, "cleanup failed: {:#}", error);
                state
                    .ui()
                    .error(&format!("Cleanup of step '{}' failed: {:#}", name, error));
                report.cleanup_failures.push(CleanupFailure {
                    step: name.clone(),
                    error,
                });
            }
            report.cleaned.push(name);
        }

        report
    }
}
