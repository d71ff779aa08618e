//! Vault password lifetime inside the target.
//!
//! # Design
//! - The secret value is never formatted; `SecretValue` redacts itself in `Debug`.
//! - `SecretStage::erase` consumes the `StagedSecret`, so a file is erased at most
//!   once; a `StagedSecret` dropped without erasure removes its file on drop.
//! - The file is created with mode `0600` before any bytes are written.
//! - The file must not exist beforehand and is opened without following
//!   symlinks; `<target>/tmp` must be a real directory. A path inside the
//!   target never resolves to a host file.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{SecretError, SecretResult};
use crate::paths::TargetRoot;

/// Location of the vault password file as seen from inside the target.
pub const VAULT_PASSWORD_PATH: &str = "/tmp/vault_password";

/// An opaque secret string.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wrap a secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Callers must not log the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SecretValue(<redacted>)")
    }
}

/// Supplies the vault password on demand.
pub trait SecretSource: Send + Sync {
    /// Fetch the secret; `None` when unavailable.
    fn fetch(&self) -> Option<SecretValue>;

    /// Human-readable description used in errors and logs.
    fn describe(&self) -> String;
}

/// Reads the secret from a named environment variable.
#[derive(Debug, Clone)]
pub struct EnvSecretSource {
    variable: String,
}

impl EnvSecretSource {
    /// Read from `variable`.
    #[must_use]
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl SecretSource for EnvSecretSource {
    fn fetch(&self) -> Option<SecretValue> {
        std::env::var(&self.variable)
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretValue::new)
    }

    fn describe(&self) -> String {
        format!("env:{}", self.variable)
    }
}

/// A fixed secret, or a fixed absence of one.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource(Option<SecretValue>);

impl StaticSecretSource {
    /// Source that always yields `value`.
    #[must_use]
    pub fn present(value: impl Into<String>) -> Self {
        Self(Some(SecretValue::new(value)))
    }

    /// Source that never yields a value.
    #[must_use]
    pub const fn absent() -> Self {
        Self(None)
    }
}

impl SecretSource for StaticSecretSource {
    fn fetch(&self) -> Option<SecretValue> {
        self.0.clone()
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Handle to a secret file written inside the target.
#[derive(Debug)]
pub struct StagedSecret {
    host_path: PathBuf,
    in_target_path: PathBuf,
    present: bool,
}

impl StagedSecret {
    /// Host location of the secret file.
    #[must_use]
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Location of the secret file as seen from inside the target.
    #[must_use]
    pub fn in_target_path(&self) -> &Path {
        &self.in_target_path
    }

    /// Whether the file is still expected to exist.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }

    fn remove(&mut self) -> io::Result<()> {
        if !self.present {
            return Ok(());
        }
        self.present = false;
        match fs::remove_file(&self.host_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for StagedSecret {
    fn drop(&mut self) {
        if let Err(err) = self.remove() {
            warn!(
                path = %self.host_path.display(),
                error = %err,
                "failed to remove abandoned secret file"
            );
        }
    }
}

/// Writes and erases the vault password file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecretStage;

impl SecretStage {
    /// Construct a secret stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fetch a secret from `source` and write it into the target.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::SourceMissing`] when the source has no value, or an
    /// IO error from [`Self::write`].
    pub fn write_from_source(
        &self,
        target_mount: &Path,
        source: &dyn SecretSource,
    ) -> SecretResult<StagedSecret> {
        let secret = source.fetch().ok_or_else(|| SecretError::SourceMissing {
            source_name: source.describe(),
        })?;
        self.write(target_mount, &secret)
    }

    /// Write `secret` to `<target_mount>/tmp/vault_password` with mode `0600`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::DestinationExists`] when anything (file or
    /// symlink) already occupies the path, [`SecretError::UnsafeDirectory`]
    /// when `<target_mount>/tmp` is a symlink or not a directory, and
    /// [`SecretError::IoFailure`] if the directory or file cannot be written.
    pub fn write(&self, target_mount: &Path, secret: &SecretValue) -> SecretResult<StagedSecret> {
        let in_target_path = PathBuf::from(VAULT_PASSWORD_PATH);
        let host_path = TargetRoot::new(target_mount)
            .host_path(&in_target_path)
            .map_err(|err| {
                SecretError::io("secret.resolve", err.path.clone(), io::Error::other(err))
            })?;
        if let Some(parent) = host_path.parent() {
            ensure_private_dir(parent)?;
        }

        let mut file = match open_private(&host_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SecretError::DestinationExists { path: host_path });
            }
            Err(err) => return Err(SecretError::io("secret.open", host_path, err)),
        };
        let staged = StagedSecret {
            host_path,
            in_target_path,
            present: true,
        };
        restrict_permissions(&file)
            .map_err(|err| SecretError::io("secret.chmod", &staged.host_path, err))?;
        file.write_all(secret.expose().as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|err| SecretError::io("secret.write", &staged.host_path, err))?;
        drop(file);

        info!(path = %staged.host_path.display(), "staged vault password file");
        Ok(staged)
    }

    /// Remove the secret file.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::IoFailure`] if the file exists but cannot be removed.
    pub fn erase(&self, mut staged: StagedSecret) -> SecretResult<()> {
        let path = staged.host_path.clone();
        staged
            .remove()
            .map_err(|err| SecretError::io("secret.erase", &path, err))?;
        debug!(path = %path.display(), "erased vault password file");
        Ok(())
    }
}

fn ensure_private_dir(dir: &Path) -> SecretResult<()> {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SecretError::UnsafeDirectory {
            path: dir.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|err| SecretError::io("secret.create_dir", dir, err))
        }
        Err(err) => Err(SecretError::io("secret.inspect_dir", dir, err)),
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .custom_flags(libc::O_NOFOLLOW)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn restrict_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
