//! Process execution for the provisioning command.
//!
//! # Design
//! - The child is spawned with `kill_on_drop`, so abandoning the wait on timeout
//!   or cancellation kills it.
//! - stdin is closed; stdout and stderr are captured in full.
//! - In chroot mode the tool argv is prefixed with `<chroot> <root>` and all
//!   paths in it are interpreted inside the target.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tokio::process::Command;
use tracing::{info, warn};

use crate::cancel::Cancellation;
use crate::command::{PlaybookCommand, path_arg, render_argv};
use crate::error::{ExecError, ExecResult};

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Exit code; `128 + signal` when killed by a signal, `-1` if unknown.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// `true` iff `exit_code == 0`.
    pub succeeded: bool,
    /// Wall-clock duration from spawn to exit.
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Runs [`PlaybookCommand`]s, optionally inside a chroot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvoker {
    chroot: Option<(String, PathBuf)>,
    timeout: Option<Duration>,
}

impl CommandInvoker {
    /// Run the tool directly on the host.
    #[must_use]
    pub const fn host() -> Self {
        Self {
            chroot: None,
            timeout: None,
        }
    }

    /// Run the tool inside `root` via `binary`.
    #[must_use]
    pub fn chroot(binary: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            chroot: Some((binary.into(), root.into())),
            timeout: None,
        }
    }

    /// Kill the command if it runs longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument vector that will actually be spawned.
    #[must_use]
    pub fn launch_argv(&self, command: &PlaybookCommand) -> Vec<String> {
        let tool = command.argv();
        match &self.chroot {
            Some((binary, root)) => {
                let mut argv = Vec::with_capacity(tool.len() + 2);
                argv.push(binary.clone());
                argv.push(path_arg(root));
                argv.extend(tool);
                argv
            }
            None => tool,
        }
    }

    /// Shell-quoted rendering of [`Self::launch_argv`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Render`] if an argument contains a NUL byte.
    pub fn render(&self, command: &PlaybookCommand) -> ExecResult<String> {
        render_argv(&self.launch_argv(command))
    }

    /// Spawn the command and wait for it to exit.
    ///
    /// A non-zero exit status is returned as an unsuccessful [`CommandOutcome`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::LaunchFailed`] if the program cannot start,
    /// [`ExecError::TimedOut`] or [`ExecError::Cancelled`] if the child was
    /// killed, and [`ExecError::Wait`] if its output cannot be collected.
    pub async fn run(
        &self,
        command: &PlaybookCommand,
        cancellation: &Cancellation,
    ) -> ExecResult<CommandOutcome> {
        let argv = self.launch_argv(command);
        let program = argv.first().cloned().unwrap_or_default();
        if cancellation.is_cancelled() {
            return Err(ExecError::Cancelled { program });
        }

        let rendered = render_argv(&argv)?;
        info!(command = %rendered, "launching provisioning command");

        let mut process = Command::new(&program);
        process
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = process
            .spawn()
            .map_err(|source| ExecError::LaunchFailed {
                program: program.clone(),
                source,
            })?;

        let guarded = async {
            tokio::select! {
                output = child.wait_with_output() => Ok(output),
                () = cancellation.cancelled() => Err(ExecError::Cancelled { program: program.clone() }),
            }
        };
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| ExecError::TimedOut {
                    program: program.clone(),
                    timeout: limit,
                })
                .and_then(|result| result),
            None => guarded.await,
        };
        let output = match waited {
            Ok(output) => output.map_err(|source| ExecError::Wait {
                program: program.clone(),
                source,
            })?,
            Err(err) => {
                warn!(program = %program, reason = err.kind(), "provisioning command killed");
                return Err(err);
            }
        };

        let duration = started.elapsed();
        let exit_code = exit_code(output.status);
        let outcome = CommandOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            succeeded: exit_code == 0,
            duration,
        };
        info!(
            exit_code,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "provisioning command exited"
        );
        Ok(outcome)
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
