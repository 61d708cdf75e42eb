//! Cooperative cancellation signal shared between a runner and its steps.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One-shot cancellation latch.
///
/// Cloning yields a handle to the same latch. Once [`cancel`](Self::cancel)
/// has been called the token stays cancelled for the rest of its life.
/// Nothing is interrupted forcibly: running code observes the signal through
/// [`is_cancelled`](Self::is_cancelled) or [`sleep`](Self::sleep).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a valid bool; the latch never needs recovery.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raises the signal and wakes every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        if !*cancelled {
            *cancelled = true;
            tracing::debug!("cancellation requested");
        }
        self.inner.1.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for `duration` or until cancelled, whichever comes first.
    ///
    /// Returns `true` if the token is cancelled when the call returns.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.lock();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = self
                .inner
                .1
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }
}
