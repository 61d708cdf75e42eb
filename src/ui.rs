//! Human-facing progress output.
//!
//! Steps report progress through a [`Ui`] handle stored in the state bag.
//! Output is purely informational and has no effect on control flow.

use tracing::{error, info};

/// Sink for human-readable build progress.
pub trait Ui: Send + Sync {
    /// Announces a major action (e.g. "Creating server...").
    fn say(&self, message: &str);

    /// Reports a detail belonging to the last announced action.
    fn message(&self, message: &str);

    /// Reports a problem the operator should see.
    fn error(&self, message: &str);
}

/// `Ui` implementation that forwards everything to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingUi {
    prefix: Option<String>,
}

impl TracingUi {
    /// Creates a UI whose lines are tagged with the builder name.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn format(&self, message: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}: {}", prefix, message),
            None => message.to_string(),
        }
    }
}

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        info!("==> {}", self.format(message));
    }

    fn message(&self, message: &str) {
        info!("    {}", self.format(message));
    }

    fn error(&self, message: &str) {
        error!("{}", self.format(message));
    }
}
