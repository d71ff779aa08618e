//! CLI errors and their exit codes.

use std::fmt::{self, Display, Formatter};

use anyhow::anyhow;
use provisor_app::{PipelineError, ProvisioningFailure};
use provisor_config::ConfigError;

/// Error type used by CLI handlers.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
    CommandFailed(String),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
            Self::CommandFailed(_) => 4,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::CommandFailed(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }

    pub(crate) fn from_config(error: ConfigError) -> Self {
        match error {
            ConfigError::Io { .. } => Self::failure(error),
            ConfigError::MissingField { field } => {
                Self::validation(format!("missing configuration field {field}"))
            }
            ConfigError::InvalidField { field, reason, .. } => {
                Self::validation(format!("invalid {field}: {reason}"))
            }
            other => Self::validation(format!("{:#}", anyhow!(other))),
        }
    }

    pub(crate) fn from_pipeline(error: PipelineError) -> Self {
        match error {
            PipelineError::InvalidRequest { field, reason } => {
                Self::validation(format!("invalid {field}: {reason}"))
            }
            other => Self::failure(other),
        }
    }

    pub(crate) fn from_failure(failure: ProvisioningFailure) -> Self {
        let summary = failure.to_string();
        match failure.error {
            PipelineError::InvalidRequest { field, reason } => {
                Self::validation(format!("invalid {field}: {reason}"))
            }
            PipelineError::CommandFailed { exit_code, .. } => {
                Self::CommandFailed(format!("{summary}: command exited with code {exit_code}"))
            }
            PipelineError::Exec { source } => {
                Self::CommandFailed(format!("{summary}: {:#}", anyhow!(source)))
            }
            other => Self::Failure(anyhow!(other).context(summary)),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;
    use provisor_app::Phase;
    use uuid::Uuid;

    fn failure_with(error: PipelineError) -> ProvisioningFailure {
        ProvisioningFailure {
            run_id: Uuid::nil(),
            phase: Phase::Execute,
            error,
            cleanup_errors: Vec::new(),
            record: None,
            outcome: None,
            inventory: None,
            steps: Vec::new(),
            states: Vec::new(),
        }
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow!("io")).exit_code(), 3);
        assert_eq!(CliError::CommandFailed("rc".into()).exit_code(), 4);
    }

    #[test]
    fn command_failure_maps_to_dedicated_exit_code() {
        let err = CliError::from_failure(failure_with(PipelineError::CommandFailed {
            exit_code: 2,
            stderr: "boom".into(),
        }));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(
            err.display_message(),
            "provisioning failed during execute: command exited with code 2"
        );
    }

    #[test]
    fn invalid_request_maps_to_validation() {
        let err = CliError::from_failure(failure_with(PipelineError::InvalidRequest {
            field: "target_mount_path",
            reason: "must be absolute",
        }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "invalid target_mount_path: must be absolute"
        );
    }
}
