//! Error types for command execution.
//!
//! A non-zero exit status is not an error; it is reported through
//! [`crate::CommandOutcome`].

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Failures that prevent a command from producing an exit status.
#[derive(Debug, Error)]
pub enum ExecError {
    /// An argument could not be rendered as a shell word.
    #[error("command could not be rendered")]
    Render {
        /// Underlying quoting error.
        source: shlex::QuoteError,
    },
    /// The program could not be started.
    #[error("command failed to launch")]
    LaunchFailed {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The command exceeded its time limit and was killed.
    #[error("command timed out")]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Configured limit.
        timeout: Duration,
    },
    /// The command was cancelled and killed.
    #[error("command cancelled")]
    Cancelled {
        /// Program that was killed.
        program: String,
    },
    /// Waiting for the process or reading its output failed.
    #[error("failed waiting for command")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl ExecError {
    /// Stable label used in journals and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Render { .. } => "render",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled { .. } => "cancelled",
            Self::Wait { .. } => "wait",
        }
    }
}
