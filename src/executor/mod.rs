//! Local command execution.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for commands to execute
//! - [`ExecutionResult`]: Exit status and captured stdout of a command
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`RealCommandExecutor`]: Production implementation using `std::process::Command`
//!
//! The Hyper-V driver is the only consumer: every PowerShell invocation goes
//! through a `CommandExecutor`, which lets tests substitute a recording fake.

mod pipe;
mod real;

use std::process::ExitStatus;

use anyhow::Result;
use camino::Utf8PathBuf;

pub(crate) use pipe::panic_message;
pub use real::RealCommandExecutor;

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages to consistently format command arguments
/// (e.g., `"-NoProfile" "-File" "C:\\tmp\\script.ps1"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command to execute (e.g., "powershell.exe")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (optional, defaults to current directory)
    pub cwd: Option<Utf8PathBuf>,
    /// Environment variables to set (in addition to inherited environment)
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: Utf8PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable rendering for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, format_command_args(&self.args))
        }
    }
}

/// Result of command execution
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the command
    pub status: ExitStatus,
    /// Everything the command wrote to stdout, lossily decoded as UTF-8
    pub stdout: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Returns the exit code if available (None when killed by a signal)
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` so one executor can be shared by a
/// driver that lives inside a boxed, `Send` step.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command and waits for it to finish.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_arguments() {
        let spec = CommandSpec::new(
            "powershell.exe",
            vec!["-NoProfile".to_string(), "-File".to_string(), "a b.ps1".to_string()],
        );
        assert_eq!(spec.display(), r#"powershell.exe "-NoProfile" "-File" "a b.ps1""#);
    }

    #[test]
    fn test_display_without_arguments() {
        assert_eq!(CommandSpec::new("true", vec![]).display(), "true");
    }

    #[test]
    fn test_builder_methods() {
        let spec = CommandSpec::new("pwsh", vec![])
            .with_cwd(Utf8PathBuf::from("/tmp"))
            .with_env("PSModulePath", "/opt/modules");
        assert_eq!(spec.cwd.as_deref().map(|p| p.as_str()), Some("/tmp"));
        assert_eq!(spec.env, vec![("PSModulePath".to_string(), "/opt/modules".to_string())]);
    }
}
