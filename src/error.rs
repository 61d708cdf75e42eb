//! Domain-specific error types for packstep.
//!
//! `PackstepError` is a `thiserror`-based enum with typed variants for the
//! failure modes a build can hit: configuration problems, state bag misuse,
//! polling outcomes and synthesized build results. Trait boundaries (steps,
//! provider clients, hooks) use `anyhow::Result`; `PackstepError` converts
//! with `?` and stays reachable through `anyhow::Error::downcast_ref`.

use std::io;
use std::time::Duration;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::AlreadyExists => "I/O error: already exists".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for packstep.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PackstepError {
    /// A configuration constraint was violated during `prepare`.
    #[error("validation error: {0}")]
    Validation(String),

    /// A profile could not be loaded or parsed, or cannot be run.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred.
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A state bag key was read before any step stored it.
    #[error("state key '{key}' is not present")]
    MissingState { key: &'static str },

    /// A state bag key holds a value of a different type than requested.
    #[error("state key '{key}' does not hold a value of type {expected}")]
    StateType {
        key: &'static str,
        expected: &'static str,
    },

    /// A polled resource reached a terminal state other than the one awaited.
    #[error("{resource} entered unexpected state '{state}'")]
    UnexpectedState { resource: String, state: String },

    /// A bounded poll ran out of time.
    #[error("timeout after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    /// A poll or wait observed the cancellation signal.
    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },

    /// A step returned `Halt` without recording an error.
    #[error("step '{step}' halted without reporting an error")]
    StepHalted { step: String },

    /// A step panicked while running.
    #[error("step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },

    /// The build was cancelled and no more specific error was recorded.
    #[error("build was cancelled")]
    BuildCancelled,

    /// The build was halted and no more specific error was recorded.
    #[error("build was halted")]
    BuildHalted,

    /// A local command (e.g. a PowerShell script) failed.
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed.
        command: String,
        /// Exit code, signal information or an internal failure description.
        status: String,
    },
}

impl PackstepError {
    /// Creates an `Io` variant with the `message` derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Creates an `UnexpectedState` variant.
    pub fn unexpected_state(resource: impl Into<String>, state: impl Into<String>) -> Self {
        Self::UnexpectedState {
            resource: resource.into(),
            state: state.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = PackstepError::Validation("server_type must be set".to_string());
        assert_eq!(err.to_string(), "validation error: server_type must be set");
    }

    #[test]
    fn test_missing_state_display() {
        let err = PackstepError::MissingState { key: "server_id" };
        assert_eq!(err.to_string(), "state key 'server_id' is not present");
    }

    #[test]
    fn test_state_type_display() {
        let err = PackstepError::StateType {
            key: "server_id",
            expected: "alloc::string::String",
        };
        assert!(err.to_string().contains("server_id"));
        assert!(err.to_string().contains("alloc::string::String"));
    }

    #[test]
    fn test_unexpected_state_display() {
        let err = PackstepError::unexpected_state("image img-1", "failed");
        assert_eq!(err.to_string(), "image img-1 entered unexpected state 'failed'");
    }

    #[test]
    fn test_timeout_display() {
        let err = PackstepError::Timeout {
            what: "server 42 to stop".to_string(),
            timeout: Duration::from_secs(600),
        };
        assert_eq!(err.to_string(), "timeout after 600s waiting for server 42 to stop");
    }

    #[test]
    fn test_build_results_display() {
        assert_eq!(PackstepError::BuildCancelled.to_string(), "build was cancelled");
        assert_eq!(PackstepError::BuildHalted.to_string(), "build was halted");
    }

    #[test]
    fn test_execution_display() {
        let err = PackstepError::Execution {
            command: "powershell.exe".to_string(),
            status: "exit status: 1".to_string(),
        };
        assert_eq!(err.to_string(), "command execution failed: powershell.exe: exit status: 1");
    }

    #[test]
    fn test_io_display() {
        let source = io::Error::new(io::ErrorKind::NotFound, "entity not found");
        let err = PackstepError::io("/path/to/profile.yml", source);
        assert_eq!(err.to_string(), "/path/to/profile.yml: I/O error: not found");
    }

    #[test]
    fn test_io_source_preserved() {
        let source = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = PackstepError::io("/var/lib/output", source);
        match &err {
            PackstepError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_io_error_kind_message_other() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let msg = io_error_kind_message(&err);
        assert!(msg.starts_with("I/O error: "));
    }

    #[test]
    fn test_into_anyhow_error() {
        let err = PackstepError::BuildHalted;
        let anyhow_err: anyhow::Error = err.into();
        let downcast = anyhow_err.downcast_ref::<PackstepError>();
        assert!(matches!(downcast, Some(PackstepError::BuildHalted)));
    }
}
