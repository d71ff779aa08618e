//! Reversible, non-overwriting staging of the playbook tree into the target.
//!
//! # Design
//! - Preconditions are checked before any mutation; `DestinationExists` leaves
//!   the target untouched.
//! - A copy that fails part-way removes whatever it created under the destination.
//! - Unstaging is idempotent: an absent destination is an outcome, not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{StageError, StageResult};

/// Result of an unstage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnstageOutcome {
    /// Destination tree was removed.
    Removed,
    /// Removal was skipped because the caller asked to keep the tree.
    Kept,
    /// Nothing was present at the destination.
    AlreadyAbsent,
}

impl UnstageOutcome {
    /// Stable label for logs and journals.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Kept => "kept",
            Self::AlreadyAbsent => "already_absent",
        }
    }
}

/// Copies playbooks into the target and removes them again.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactStager;

impl ArtifactStager {
    /// Construct a stager.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Recursively copy `source` to `destination`.
    ///
    /// Symlinks in the source are followed and their contents copied.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::SourceMissing`] if `source` is not a directory,
    /// [`StageError::DestinationExists`] if `destination` is present, and
    /// [`StageError::IoFailure`] if the copy fails.
    pub fn stage(&self, source: &Path, destination: &Path) -> StageResult<()> {
        if !source.is_dir() {
            return Err(StageError::SourceMissing {
                path: source.to_path_buf(),
            });
        }
        match fs::symlink_metadata(destination) {
            Ok(_) => {
                return Err(StageError::DestinationExists {
                    path: destination.to_path_buf(),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(StageError::io("stage.inspect_destination", destination, err)),
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StageError::io("stage.create_parent", parent, err))?;
        }

        match copy_tree(source, destination) {
            Ok(files) => {
                info!(
                    source = %source.display(),
                    destination = %destination.display(),
                    files,
                    "staged playbooks"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = remove_tree(destination) {
                    warn!(
                        destination = %destination.display(),
                        error = %cleanup,
                        "failed to remove partial staging copy"
                    );
                }
                Err(err)
            }
        }
    }

    /// Remove a previously staged tree unless `keep` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::IoFailure`] if the tree exists but cannot be removed.
    pub fn unstage(&self, destination: &Path, keep: bool) -> StageResult<UnstageOutcome> {
        if keep {
            debug!(destination = %destination.display(), "keeping staged playbooks");
            return Ok(UnstageOutcome::Kept);
        }
        match remove_tree(destination) {
            Ok(true) => {
                info!(destination = %destination.display(), "removed staged playbooks");
                Ok(UnstageOutcome::Removed)
            }
            Ok(false) => Ok(UnstageOutcome::AlreadyAbsent),
            Err(err) => Err(StageError::io("unstage.remove", destination, err)),
        }
    }
}

fn copy_tree(source: &Path, destination: &Path) -> StageResult<usize> {
    let mut directories: Vec<(PathBuf, fs::Permissions)> = Vec::new();
    let mut files = 0;

    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map_or_else(|| source.to_path_buf(), Path::to_path_buf);
            StageError::io("stage.walk", path, io::Error::from(err))
        })?;
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            StageError::io(
                "stage.strip_prefix",
                entry.path(),
                io::Error::other("entry outside staging source"),
            )
        })?;
        let target_path = destination.join(relative);
        let metadata = entry
            .metadata()
            .map_err(|err| StageError::io("stage.metadata", entry.path(), io::Error::from(err)))?;

        if metadata.is_dir() {
            fs::create_dir_all(&target_path)
                .map_err(|err| StageError::io("stage.create_dir", &target_path, err))?;
            directories.push((target_path, metadata.permissions()));
        } else {
            fs::copy(entry.path(), &target_path)
                .map_err(|err| StageError::io("stage.copy_file", &target_path, err))?;
            files += 1;
        }
    }

    // Applied deepest-first so read-only directories do not block their children.
    for (path, permissions) in directories.into_iter().rev() {
        fs::set_permissions(&path, permissions)
            .map_err(|err| StageError::io("stage.set_permissions", &path, err))?;
    }

    Ok(files)
}

/// Remove a file or tree; `Ok(false)` when nothing was there.
fn remove_tree(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
