//! Real command executor implementation.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use which::which;

use super::pipe::{capture_pipe, log_pipe, panic_message};
use super::{CommandExecutor, CommandSpec, ExecutionResult};
use crate::error::PackstepError;

/// Kills a child process and joins its reader threads.
///
/// Called from error paths in [`RealCommandExecutor::execute()`] so a failed
/// spawn or wait never leaks a process or a thread.
fn cleanup_child_process(
    child: &mut Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<()>>,
) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    if let Some(Err(e)) = stdout.map(JoinHandle::join) {
        tracing::warn!("stdout reader panicked during cleanup: {}", panic_message(&*e));
    }
    if let Some(Err(e)) = stderr.map(JoinHandle::join) {
        tracing::warn!("stderr reader panicked during cleanup: {}", panic_message(&*e));
    }
}

/// Command executor that runs actual system commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    fn failure(spec: &CommandSpec, status: String) -> anyhow::Error {
        PackstepError::Execution {
            command: spec.display(),
            status,
        }
        .into()
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let cmd =
            which(&spec.command).with_context(|| format!("command not found: {}", spec.command))?;
        tracing::trace!("command found: {}: {}", spec.command, cmd.to_string_lossy());

        let mut command = Command::new(cmd);
        command.args(&spec.args);

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().with_context(|| {
            format!("failed to spawn command `{}` with args {:?}", spec.command, spec.args)
        })?;

        tracing::trace!("spawned command: {}: pid={}", spec.command, child.id());

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || capture_pipe(stdout_pipe))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, None, None);
                return Err(Self::failure(
                    spec,
                    format!("failed to spawn stdout reader thread: {}", e),
                ));
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || log_pipe(stderr_pipe))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, Some(stdout_handle), None);
                return Err(Self::failure(
                    spec,
                    format!("failed to spawn stderr reader thread: {}", e),
                ));
            }
        };

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                cleanup_child_process(&mut child, Some(stdout_handle), Some(stderr_handle));
                return Err(Self::failure(spec, format!("failed to wait for command: {}", e)));
            }
        };

        let mut panicked_streams = Vec::new();
        let stdout = match stdout_handle.join() {
            Ok(stdout) => stdout,
            Err(e) => {
                let msg = panic_message(&*e);
                tracing::error!(stream = "stdout", panic = msg, "reader thread panicked");
                panicked_streams.push(format!("stdout: {}", msg));
                String::new()
            }
        };
        if let Err(e) = stderr_handle.join() {
            let msg = panic_message(&*e);
            tracing::error!(stream = "stderr", panic = msg, "reader thread panicked");
            panicked_streams.push(format!("stderr: {}", msg));
        }

        if !panicked_streams.is_empty() {
            return Err(Self::failure(
                spec,
                format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            ));
        }

        tracing::trace!("executed command: {}: success={}", spec.command, status.success());

        Ok(ExecutionResult { status, stdout })
    }
}
