//! # Design
//!
//! - Centralize lifecycle errors for the provisioning pipeline.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use provisor_exec::ExecError;
use provisor_fsops::{InventoryError, SecretError, StageError};
use thiserror::Error;

use crate::state::PipelineState;

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline-level error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request failed validation before any stage ran.
    #[error("provisioning request invalid")]
    InvalidRequest {
        /// Request field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A lifecycle call was made from a state that does not allow it.
    #[error("invalid pipeline transition")]
    InvalidTransition {
        /// State the pipeline was in.
        from: PipelineState,
        /// Lifecycle call that was attempted.
        operation: &'static str,
    },
    /// Playbook staging failed.
    #[error("artifact staging failed")]
    Stage {
        /// Source staging error.
        source: StageError,
    },
    /// Inventory materialisation failed.
    #[error("inventory write failed")]
    Inventory {
        /// Source inventory error.
        source: InventoryError,
    },
    /// Vault password staging failed.
    #[error("secret staging failed")]
    Secret {
        /// Source secret error.
        source: SecretError,
    },
    /// The command did not produce an exit status.
    #[error("provisioning command did not complete")]
    Exec {
        /// Source execution error.
        source: ExecError,
    },
    /// The command exited non-zero.
    #[error("provisioning command failed")]
    CommandFailed {
        /// Exit code reported by the command.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },
    /// Erasing the vault password file failed.
    #[error("secret erase failed")]
    EraseSecret {
        /// Source secret error.
        source: SecretError,
    },
    /// Removing staged playbooks failed.
    #[error("unstaging failed")]
    Unstage {
        /// Source staging error.
        source: StageError,
    },
}

impl PipelineError {
    pub(crate) const fn invalid_request(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidRequest { field, reason }
    }

    /// Whether this error reports a command that ran and exited non-zero.
    #[must_use]
    pub const fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}
