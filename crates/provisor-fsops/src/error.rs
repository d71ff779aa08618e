//! # Design
//!
//! - Provide structured, constant-message errors per filesystem component.
//! - Capture operation context (paths, operations) to make failures reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for artifact staging.
pub type StageResult<T> = Result<T, StageError>;
/// Result type for secret staging.
pub type SecretResult<T> = Result<T, SecretError>;
/// Result type for inventory materialisation.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// A path meant to live inside the target escaped it.
#[derive(Debug, Error)]
#[error("path escapes target root")]
pub struct TargetPathError {
    /// Offending in-target path.
    pub path: PathBuf,
}

/// Errors produced while staging or unstaging playbooks.
#[derive(Debug, Error)]
pub enum StageError {
    /// Source is not an existing directory.
    #[error("staging source missing")]
    SourceMissing {
        /// Source path that was checked.
        path: PathBuf,
    },
    /// Destination already exists; staging never overwrites.
    #[error("staging destination already exists")]
    DestinationExists {
        /// Destination path that was found.
        path: PathBuf,
    },
    /// IO failure while copying or removing.
    #[error("staging io failure")]
    IoFailure {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl StageError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Errors produced by the vault password lifecycle.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Secret staging was requested but the source produced no value.
    #[error("secret source missing")]
    SourceMissing {
        /// Description of the source that was consulted.
        source_name: String,
    },
    /// Something already exists at the secret path; it is never overwritten
    /// or followed.
    #[error("secret destination already exists")]
    DestinationExists {
        /// Host path that was found occupied.
        path: PathBuf,
    },
    /// The directory receiving the secret is a symlink or not a directory.
    #[error("secret directory unsafe")]
    UnsafeDirectory {
        /// Host path of the offending directory.
        path: PathBuf,
    },
    /// IO failure while writing or removing the secret file.
    #[error("secret io failure")]
    IoFailure {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl SecretError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Errors produced while writing the inventory file.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Inventory directory escapes the target root.
    #[error("inventory path invalid")]
    InvalidPath {
        /// Underlying path mapping error.
        #[from]
        source: TargetPathError,
    },
    /// Inventory file name is not a single path component.
    #[error("inventory file name invalid")]
    InvalidFileName {
        /// Offending file name.
        filename: String,
    },
    /// IO failure while writing the inventory.
    #[error("inventory io failure")]
    IoFailure {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl InventoryError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            operation,
            path: path.into(),
            source,
        }
    }
}
