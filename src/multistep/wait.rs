//! Bounded, cancellable polling for remote state transitions.
//!
//! Steps that wait for a server to start, an image to become available or a
//! machine to stop use [`wait_for`]. The wait checks the cancellation token
//! between polls and sleeps on it, so cancellation takes effect within one
//! polling interval.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use super::CancelToken;
use crate::error::PackstepError;

/// Default budget for machine state transitions.
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polling configuration for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between polls.
    pub interval: Duration,
    /// Maximum total time to wait before giving up.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_STATE_TIMEOUT,
        }
    }
}

impl WaitConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// The awaited state was reached.
    Ready(T),
    /// Not there yet; poll again after the interval.
    Pending,
}

/// Polls until `poll` reports [`Poll::Ready`].
///
/// Returns:
/// - the ready value,
/// - [`PackstepError::Timeout`] once `config.timeout` has elapsed,
/// - [`PackstepError::Cancelled`] when `cancel` fires,
/// - the poll's own error unchanged. Polls report unwanted terminal states
///   with [`PackstepError::UnexpectedState`].
pub fn wait_for<T>(
    what: &str,
    cancel: &CancelToken,
    config: WaitConfig,
    mut poll: impl FnMut() -> Result<Poll<T>>,
) -> Result<T> {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PackstepError::Cancelled {
                what: what.to_string(),
            }
            .into());
        }

        attempts += 1;
        if let Poll::Ready(value) = poll()? {
            debug!(what, attempts, "wait finished");
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Err(PackstepError::Timeout {
                what: what.to_string(),
                timeout: config.timeout,
            }
            .into());
        }

        debug!(what, attempts, "not ready yet");
        let delay = config.interval.min(config.timeout - elapsed);
        if cancel.sleep(delay) {
            return Err(PackstepError::Cancelled {
                what: what.to_string(),
            }
            .into());
        }
    }
}
