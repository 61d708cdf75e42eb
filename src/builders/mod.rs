//! Provider builders.
//!
//! Every builder follows the same shape: a `config` module with `prepare`, a
//! `client` trait standing for the provider SDK, a handful of steps, a
//! `steps(config)` function that assembles the sequence, the builder itself
//! and its artifact. The sequence is where provider rules live: which steps
//! run, in which order and under which config flags.

pub mod hcloud;
pub mod hyperv;
pub mod oneandone;
pub mod osc;
pub mod triton;
pub mod vsphere;

use std::sync::Arc;

use crate::communicator::{CONNECTOR, Connector};
use crate::error::PackstepError;
use crate::multistep::StateBag;
use crate::provisioners::{HOOK, Hook};
use crate::ui::Ui;

/// Creates the state bag for one build with the entries every builder seeds.
pub(crate) fn new_state(
    ui: Arc<dyn Ui>,
    hook: Arc<dyn Hook>,
    connector: Option<&Arc<dyn Connector>>,
) -> StateBag {
    let mut state = StateBag::new(ui);
    state.put(HOOK, hook);
    if let Some(connector) = connector {
        state.put(CONNECTOR, Arc::clone(connector));
    }
    state
}

/// Generates a resource name that is unique per build, e.g. `packer-5f1c...`.
pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Fills `field` with a generated name when it is empty.
pub(crate) fn default_name(field: &mut String, prefix: &str) {
    if field.trim().is_empty() {
        *field = unique_name(prefix);
    }
}

/// Turns a list of validation problems into one error.
pub(crate) fn validation_result(errors: Vec<String>) -> Result<(), PackstepError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PackstepError::Validation(errors.join("; ")))
    }
}
