//! The shared, mutable context of a single build.
//!
//! Values are stored by name and retrieved through typed [`StateKey`]s, so a
//! producer and its consumers agree on the value type at compile time. Reads
//! of absent keys return [`PackstepError::MissingState`] instead of a default
//! value, which is what cleanup code relies on to decide whether a resource
//! was ever created.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::PackstepError;
use crate::ui::Ui;

/// Typed name of a state bag entry.
///
/// Keys are declared as constants next to the step that produces them:
///
/// ```
/// use packstep::multistep::StateKey;
///
/// pub const SERVER_ID: StateKey<String> = StateKey::new("server_id");
/// assert_eq!(SERVER_ID.name(), "server_id");
/// ```
pub struct StateKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.name)
    }
}

/// Shared mutable context for one build run.
///
/// Besides the keyed entries, the bag carries the cross-cutting signals every
/// step and the builder consult: the UI handle, the first recorded error and
/// the cancelled/halted flags set by the runner.
pub struct StateBag {
    ui: Arc<dyn Ui>,
    values: HashMap<&'static str, Box<dyn Any + Send>>,
    error: Option<anyhow::Error>,
    cancelled: bool,
    halted: bool,
}

impl StateBag {
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            ui,
            values: HashMap::new(),
            error: None,
            cancelled: false,
            halted: false,
        }
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        Arc::clone(&self.ui)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put<T: Any + Send>(&mut self, key: StateKey<T>, value: T) {
        self.values.insert(key.name, Box::new(value));
    }

    /// Reads a value that an earlier step is known to have stored.
    pub fn get<T: Any>(&self, key: StateKey<T>) -> Result<&T, PackstepError> {
        let value = self
            .values
            .get(key.name)
            .ok_or(PackstepError::MissingState { key: key.name })?;
        value
            .downcast_ref::<T>()
            .ok_or(PackstepError::StateType {
                key: key.name,
                expected: type_name::<T>(),
            })
    }

    pub fn get_mut<T: Any>(&mut self, key: StateKey<T>) -> Result<&mut T, PackstepError> {
        let value = self
            .values
            .get_mut(key.name)
            .ok_or(PackstepError::MissingState { key: key.name })?;
        value
            .downcast_mut::<T>()
            .ok_or(PackstepError::StateType {
                key: key.name,
                expected: type_name::<T>(),
            })
    }

    /// Non-failing lookup for optional entries.
    pub fn get_ok<T: Any>(&self, key: StateKey<T>) -> Option<&T> {
        self.values.get(key.name)?.downcast_ref::<T>()
    }

    /// Removes an entry, returning it if it was present with the right type.
    pub fn remove<T: Any>(&mut self, key: StateKey<T>) -> Option<T> {
        let value = self.values.remove(key.name)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                // Put back what we could not interpret rather than losing it.
                self.values.insert(key.name, other);
                None
            }
        }
    }

    pub fn contains<T: Any>(&self, key: StateKey<T>) -> bool {
        self.get_ok(key).is_some()
    }

    /// Records the error that stops the build.
    ///
    /// The first recorded error is authoritative; later ones are logged and
    /// dropped so they cannot mask the original cause.
    pub fn set_error(&mut self, error: anyhow::Error) {
        if let Some(existing) = &self.error {
            tracing::warn!(
                recorded = %format!("{:#}", existing),
                "ignoring additional build error: {:#}",
                error
            );
            return;
        }
        self.error = Some(error);
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// True when the build stopped early for any reason, which is when
    /// deliverable resources must be torn down along with transient ones.
    pub fn is_failed(&self) -> bool {
        self.cancelled || self.halted
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn mark_halted(&mut self) {
        self.halted = true;
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("StateBag")
            .field("keys", &keys)
            .field("error", &self.error.as_ref().map(|e| format!("{:#}", e)))
            .field("cancelled", &self.cancelled)
            .field("halted", &self.halted)
            .finish()
    }
}
