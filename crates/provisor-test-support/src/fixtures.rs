//! Scratch target mounts and playbook trees.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// A temporary directory standing in for a mounted target root, alongside a
/// separate host-side workspace for playbook sources and tool scripts.
pub struct ScratchTarget {
    mount: TempDir,
    host: TempDir,
}

impl ScratchTarget {
    /// Create an empty target mount and host workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            mount: TempDir::new().context("failed to create target mount")?,
            host: TempDir::new().context("failed to create host workspace")?,
        })
    }

    /// Host path of the target mount.
    #[must_use]
    pub fn mount(&self) -> &Path {
        self.mount.path()
    }

    /// Host-side workspace outside the target.
    #[must_use]
    pub fn host(&self) -> &Path {
        self.host.path()
    }

    /// Host path for an in-target absolute path.
    #[must_use]
    pub fn in_target(&self, path: &str) -> PathBuf {
        self.mount.path().join(path.trim_start_matches('/'))
    }

    /// Write a sample playbook tree under the host workspace and return its root.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn playbooks(&self) -> Result<PathBuf> {
        let root = self.host.path().join("playbooks");
        write_playbook_tree(&root)?;
        Ok(root)
    }
}

/// Populate `root` with a small playbook tree: `site.yml`, a role, a template
/// and an executable helper script.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_playbook_tree(root: &Path) -> Result<()> {
    let files: [(&str, &str); 4] = [
        ("site.yml", "- hosts: all\n  roles:\n    - common\n"),
        ("roles/common/tasks/main.yml", "- name: ping\n  ping:\n"),
        (
            "roles/common/templates/motd.j2",
            "Provisioned {{ ami }}\n",
        ),
        ("files/bootstrap.sh", "#!/bin/sh\necho bootstrap\n"),
    ];
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }
    make_executable(&root.join("files/bootstrap.sh"))
}

/// Set mode `0755` on `path`.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to chmod {}", path.display()))
}

/// Set mode `0755` on `path`.
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
