//! Inventory file materialisation inside the target.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{InventoryError, InventoryResult};
use crate::paths::TargetRoot;

/// Location of a written inventory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRecord {
    /// Absolute path as seen from inside the target.
    pub path: PathBuf,
    /// Path on the host.
    pub host_path: PathBuf,
}

/// Writes the generated inventory into the target. The file persists after the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryWriter;

impl InventoryWriter {
    /// Construct an inventory writer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Create `dir` (and parents) under the target and write `content` to `dir/filename`,
    /// replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the location is invalid or the write fails.
    pub fn write(
        &self,
        target_mount: &Path,
        dir: &Path,
        filename: &str,
        content: &str,
    ) -> InventoryResult<InventoryRecord> {
        if !is_single_component(filename) {
            return Err(InventoryError::InvalidFileName {
                filename: filename.to_string(),
            });
        }
        let root = TargetRoot::new(target_mount);
        let host_dir = root.host_path(dir)?;
        let path = TargetRoot::absolute(dir)?.join(filename);

        fs::create_dir_all(&host_dir)
            .map_err(|err| InventoryError::io("inventory.create_dir", &host_dir, err))?;
        let host_path = host_dir.join(filename);
        fs::write(&host_path, content)
            .map_err(|err| InventoryError::io("inventory.write", &host_path, err))?;

        info!(path = %path.display(), host_path = %host_path.display(), "wrote inventory");
        Ok(InventoryRecord { path, host_path })
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    #[test]
    fn write_creates_directories_and_returns_paths() -> io::Result<()> {
        let mount = TempDir::new()?;
        let record = InventoryWriter::new()
            .write(mount.path(), Path::new("/etc/ansible"), "hosts", "127.0.0.1")
            .unwrap();

        assert_eq!(record.path, PathBuf::from("/etc/ansible/hosts"));
        assert_eq!(record.host_path, mount.path().join("etc/ansible/hosts"));
        assert_eq!(fs::read_to_string(&record.host_path)?, "127.0.0.1");
        Ok(())
    }

    #[test]
    fn write_overwrites_existing_inventory() -> io::Result<()> {
        let mount = TempDir::new()?;
        let writer = InventoryWriter::new();
        writer
            .write(mount.path(), Path::new("etc/ansible"), "hosts", "old")
            .unwrap();
        let record = writer
            .write(mount.path(), Path::new("etc/ansible"), "hosts", "[local]\n127.0.0.1\n")
            .unwrap();
        assert_eq!(
            fs::read_to_string(record.host_path)?,
            "[local]\n127.0.0.1\n"
        );
        Ok(())
    }

    #[test]
    fn write_rejects_escaping_locations() -> io::Result<()> {
        let mount = TempDir::new()?;
        let writer = InventoryWriter::new();
        assert!(matches!(
            writer.write(mount.path(), Path::new("/etc/../.."), "hosts", ""),
            Err(InventoryError::InvalidPath { .. })
        ));
        assert!(matches!(
            writer.write(mount.path(), Path::new("/etc/ansible"), "../hosts", ""),
            Err(InventoryError::InvalidFileName { .. })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn write_surfaces_io_failure() -> io::Result<()> {
        let mount = TempDir::new()?;
        fs::write(mount.path().join("etc"), "not a directory")?;
        let err = InventoryWriter::new()
            .write(mount.path(), Path::new("/etc/ansible"), "hosts", "127.0.0.1")
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::IoFailure {
                operation: "inventory.create_dir",
                ..
            }
        ));
        Ok(())
    }
}
