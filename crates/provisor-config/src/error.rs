//! Error types for option resolution.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option was not supplied by any layer.
    #[error("missing configuration field")]
    MissingField {
        /// Name of the missing option.
        field: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Option that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Execution root value was invalid.
    #[error("invalid execution root")]
    InvalidExecRoot {
        /// Execution root payload provided by the caller.
        value: String,
    },
    /// Missing-secret policy value was invalid.
    #[error("invalid missing-secret policy")]
    InvalidSecretPolicy {
        /// Policy payload provided by the caller.
        value: String,
    },
    /// Options document could not be parsed.
    #[error("failed to parse options document")]
    Parse {
        /// File the document was read from, when loaded from disk.
        path: Option<PathBuf>,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) const fn invalid(
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::InvalidField {
            field,
            reason,
            value,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
