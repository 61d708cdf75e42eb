//! Shell provisioner implementation.

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use super::HookContext;
use crate::error::PackstepError;

/// Shell provisioner configuration.
///
/// Runs each `inline` command over the communicator session, in order.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShellProvisioner {
    pub inline: Vec<String>,

    /// Exit codes treated as success (default: `[0]`)
    #[serde(default = "default_exit_codes")]
    pub expect_exit_codes: Vec<i32>,
}

fn default_exit_codes() -> Vec<i32> {
    vec![0]
}

impl ShellProvisioner {
    pub fn new(inline: Vec<String>) -> Self {
        Self {
            inline,
            expect_exit_codes: default_exit_codes(),
        }
    }

    pub fn name(&self) -> String {
        match self.inline.len() {
            1 => "inline (1 command)".to_string(),
            n => format!("inline ({} commands)", n),
        }
    }

    pub fn validate(&self) -> Result<(), PackstepError> {
        if self.inline.is_empty() {
            return Err(PackstepError::Validation(
                "shell provisioner must specify at least one inline command".to_string(),
            ));
        }
        if let Some(index) = self.inline.iter().position(|c| c.trim().is_empty()) {
            return Err(PackstepError::Validation(format!(
                "shell provisioner inline command {} is empty",
                index + 1
            )));
        }
        if self.expect_exit_codes.is_empty() {
            return Err(PackstepError::Validation(
                "shell provisioner expect_exit_codes must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn provision(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        let Some(session) = ctx.session.as_deref_mut() else {
            return Err(PackstepError::Config(
                "shell provisioner requires a communicator session".to_string(),
            )
            .into());
        };

        for command in &self.inline {
            if ctx.cancel.is_cancelled() {
                return Err(PackstepError::Cancelled {
                    what: "shell provisioner".to_string(),
                }
                .into());
            }
            ctx.ui.message(&format!("Running: {}", command));
            let code = session.run(command)?;
            debug!(command = %command, code, "remote command finished");
            if !self.expect_exit_codes.contains(&code) {
                return Err(PackstepError::Execution {
                    command: command.clone(),
                    status: format!("exit code {}", code),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_inline() {
        assert!(ShellProvisioner::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_blank_command() {
        let p = ShellProvisioner::new(vec!["uname -a".to_string(), "  ".to_string()]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("command 2"));
    }

    #[test]
    fn test_validate_ok() {
        assert!(ShellProvisioner::new(vec!["true".to_string()]).validate().is_ok());
    }

    #[test]
    fn test_name_counts_commands() {
        assert_eq!(ShellProvisioner::new(vec!["a".into()]).name(), "inline (1 command)");
        assert_eq!(
            ShellProvisioner::new(vec!["a".into(), "b".into()]).name(),
            "inline (2 commands)"
        );
    }

    #[test]
    fn test_deserialize_defaults_exit_codes() {
        let p: ShellProvisioner = serde_yaml::from_str("inline: [\"apt-get update\"]").unwrap();
        assert_eq!(p.expect_exit_codes, vec![0]);
    }
}
