//! Mapping between paths inside the target and paths on the host.
//!
//! # Design
//! - In-target paths are interpreted relative to the mount, with or without a
//!   leading `/`.
//! - Parent traversal is rejected outright rather than normalised.

use std::path::{Component, Path, PathBuf};

use crate::error::TargetPathError;

/// A mounted target root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoot {
    mount: PathBuf,
}

impl TargetRoot {
    /// Wrap the host path where the target is mounted.
    #[must_use]
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    /// Host path of the mount point.
    #[must_use]
    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// Resolve an in-target path to its location on the host.
    ///
    /// # Errors
    ///
    /// Returns [`TargetPathError`] when the path contains parent traversal or a
    /// platform prefix.
    pub fn host_path(&self, in_target: &Path) -> Result<PathBuf, TargetPathError> {
        push_normalised(self.mount.clone(), in_target)
    }

    /// Normalise an in-target path to its absolute form as seen from inside the target.
    ///
    /// # Errors
    ///
    /// Returns [`TargetPathError`] under the same conditions as [`Self::host_path`].
    pub fn absolute(in_target: &Path) -> Result<PathBuf, TargetPathError> {
        push_normalised(PathBuf::from("/"), in_target)
    }
}

fn push_normalised(mut base: PathBuf, in_target: &Path) -> Result<PathBuf, TargetPathError> {
    for component in in_target.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => base.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(TargetPathError {
                    path: in_target.to_path_buf(),
                });
            }
        }
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_path_joins_relative_and_absolute_forms() {
        let root = TargetRoot::new("/mnt/target");
        assert_eq!(
            root.host_path(Path::new("/etc/ansible")).unwrap(),
            PathBuf::from("/mnt/target/etc/ansible")
        );
        assert_eq!(
            root.host_path(Path::new("var/lib/./ansible")).unwrap(),
            PathBuf::from("/mnt/target/var/lib/ansible")
        );
        assert_eq!(root.host_path(Path::new("/")).unwrap(), root.mount());
    }

    #[test]
    fn host_path_rejects_traversal() {
        let root = TargetRoot::new("/mnt/target");
        let err = root.host_path(Path::new("/etc/../../host")).unwrap_err();
        assert_eq!(err.path, PathBuf::from("/etc/../../host"));
    }

    #[test]
    fn absolute_adds_leading_slash() {
        assert_eq!(
            TargetRoot::absolute(Path::new("etc/ansible/hosts")).unwrap(),
            PathBuf::from("/etc/ansible/hosts")
        );
        assert!(TargetRoot::absolute(Path::new("../x")).is_err());
    }
}
