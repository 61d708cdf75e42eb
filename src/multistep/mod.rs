//! Multistep orchestration engine.
//!
//! A build is an ordered list of [`Step`]s executed by a [`Runner`] against a
//! single [`StateBag`]. Forward execution stops at the first halt or
//! cancellation; afterwards every step that was reached is cleaned up in
//! reverse order, whatever the outcome.
//!
//! ## Step contract
//!
//! - `run` is called at most once. A step that returns [`StepAction::Halt`]
//!   records its error in the bag first (see [`halt`]).
//! - `cleanup` is called exactly once for every step whose `run` was entered,
//!   including steps that halted or panicked. It must be a no-op when the step
//!   never created anything, and its errors are reported, never fatal.
//! - Long-running waits inside `run` observe the [`CancelToken`].

mod cancel;
mod runner;
mod state;
pub mod wait;

use std::borrow::Cow;

pub use cancel::CancelToken;
pub use runner::{CleanupFailure, RunReport, Runner};
pub use state::{StateBag, StateKey};

/// Outcome of a step's forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop forward progress; cleanup follows.
    Halt,
}

/// One independently reversible provisioning action.
pub trait Step: Send {
    /// Human-readable name used in logs and `plan` output.
    fn name(&self) -> Cow<'_, str>;

    /// Performs the forward action.
    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction;

    /// Reverses whatever `run` created. Defaults to nothing to undo.
    fn cleanup(&mut self, _state: &mut StateBag) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records `error` as the build's failure, shows it to the operator and
/// returns [`StepAction::Halt`].
pub fn halt(state: &mut StateBag, error: impl Into<anyhow::Error>) -> StepAction {
    let error = error.into();
    state.ui().error(&format!("{:#}", error));
    state.set_error(error);
    StepAction::Halt
}

/// Evaluates a `Result`, halting the step with its error on `Err`.
///
/// Used inside `Step::run` where `?` is not available because the method
/// returns a [`StepAction`].
#[macro_export]
macro_rules! try_step {
    ($state:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => return $crate::multistep::halt($state, err),
        }
    };
}
