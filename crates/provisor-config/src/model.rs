//! Typed option models.
//!
//! # Design
//! - `OptionsDocument` is the permissive, serde-facing shape; every field is optional
//!   so documents can be layered.
//! - `Options` is the validated, immutable value handed to the provisioning pipeline.
//! - Legacy plugin key names (`extravars`, `playbooks_path_source`, ...) are accepted as aliases.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Where the external tool runs relative to the target filesystem.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecRoot {
    /// Enter the target with the chroot binary; argv carries in-target paths.
    #[default]
    Chroot,
    /// Run on the host; argv carries host paths under the mount.
    Host,
}

impl ExecRoot {
    #[must_use]
    /// Render the execution root as its lowercase string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chroot => "chroot",
            Self::Host => "host",
        }
    }
}

impl FromStr for ExecRoot {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chroot" => Ok(Self::Chroot),
            "host" => Ok(Self::Host),
            other => Err(ConfigError::InvalidExecRoot {
                value: other.to_string(),
            }),
        }
    }
}

/// Behaviour when vault support is requested but no secret is available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingSecretPolicy {
    /// Fail the run during configuration.
    #[default]
    Abort,
    /// Log the condition and run the tool without the vault option.
    Continue,
}

impl MissingSecretPolicy {
    #[must_use]
    /// Render the policy as its lowercase string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        }
    }
}

impl FromStr for MissingSecretPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(ConfigError::InvalidSecretPolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// Validated provisioning options for a single run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Options {
    /// Opaque `key=value` pairs passed through to the tool.
    pub extra_vars: String,
    /// Free-form application version recorded in provenance metadata.
    pub app_version: String,
    /// Absolute host path of the playbook tree to stage.
    pub playbooks_source_path: PathBuf,
    /// Destination of the staged playbooks, relative to the target root.
    pub playbooks_dest_relative_path: PathBuf,
    /// Directory inside the target receiving the inventory file.
    pub inventory_dir: PathBuf,
    /// Inventory file name.
    pub inventory_filename: String,
    /// Inventory file body.
    pub inventory_content: String,
    /// Whether a vault password file is staged for the run.
    pub use_vault_password: bool,
    /// Whether staged playbooks survive the run.
    pub keep_playbooks_after_run: bool,
    /// External tool binary.
    pub tool: String,
    /// Marker variable passed as `<marker>=True`.
    pub marker_var: String,
    /// Environment variable supplying the vault password.
    pub vault_password_env: String,
    /// Behaviour when the vault password is unavailable.
    pub missing_secret_policy: MissingSecretPolicy,
    /// Optional wall-clock limit for the tool, in seconds.
    pub command_timeout_secs: Option<u64>,
    /// Where the tool executes.
    pub exec_root: ExecRoot,
    /// Binary used to enter the target root.
    pub chroot_binary: String,
}

impl Options {
    /// Wall-clock limit applied to the external tool, if configured.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Permissive options document; the unit of layering.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct OptionsDocument {
    /// See [`Options::extra_vars`].
    #[serde(default, alias = "extravars")]
    pub extra_vars: Option<String>,
    /// See [`Options::app_version`].
    #[serde(default, alias = "appversion")]
    pub app_version: Option<String>,
    /// See [`Options::playbooks_source_path`].
    #[serde(default, alias = "playbooks_path_source")]
    pub playbooks_source_path: Option<PathBuf>,
    /// See [`Options::playbooks_dest_relative_path`].
    #[serde(default, alias = "playbooks_path_dest")]
    pub playbooks_dest_relative_path: Option<PathBuf>,
    /// See [`Options::inventory_dir`].
    #[serde(default, alias = "inventory_file_path")]
    pub inventory_dir: Option<PathBuf>,
    /// See [`Options::inventory_filename`].
    #[serde(default, alias = "inventory_file")]
    pub inventory_filename: Option<String>,
    /// See [`Options::inventory_content`].
    #[serde(default, alias = "inventory_file_content")]
    pub inventory_content: Option<String>,
    /// See [`Options::use_vault_password`].
    #[serde(default, alias = "vault_password")]
    pub use_vault_password: Option<bool>,
    /// See [`Options::keep_playbooks_after_run`].
    #[serde(default, alias = "keep_playbooks")]
    pub keep_playbooks_after_run: Option<bool>,
    /// See [`Options::tool`].
    #[serde(default)]
    pub tool: Option<String>,
    /// See [`Options::marker_var`].
    #[serde(default)]
    pub marker_var: Option<String>,
    /// See [`Options::vault_password_env`].
    #[serde(default)]
    pub vault_password_env: Option<String>,
    /// See [`Options::missing_secret_policy`].
    #[serde(default)]
    pub missing_secret_policy: Option<MissingSecretPolicy>,
    /// See [`Options::command_timeout_secs`].
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    /// See [`Options::exec_root`].
    #[serde(default)]
    pub exec_root: Option<ExecRoot>,
    /// See [`Options::chroot_binary`].
    #[serde(default)]
    pub chroot_binary: Option<String>,
    /// Keys not recognised by this version; reported, never applied.
    #[serde(flatten)]
    pub unrecognised: BTreeMap<String, serde_yaml::Value>,
}

impl OptionsDocument {
    /// Parse a YAML options document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid document.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Read and parse a YAML options document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            operation: "options_document.read",
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        let mut unrecognised = self.unrecognised;
        unrecognised.extend(other.unrecognised);
        Self {
            extra_vars: other.extra_vars.or(self.extra_vars),
            app_version: other.app_version.or(self.app_version),
            playbooks_source_path: other.playbooks_source_path.or(self.playbooks_source_path),
            playbooks_dest_relative_path: other
                .playbooks_dest_relative_path
                .or(self.playbooks_dest_relative_path),
            inventory_dir: other.inventory_dir.or(self.inventory_dir),
            inventory_filename: other.inventory_filename.or(self.inventory_filename),
            inventory_content: other.inventory_content.or(self.inventory_content),
            use_vault_password: other.use_vault_password.or(self.use_vault_password),
            keep_playbooks_after_run: other
                .keep_playbooks_after_run
                .or(self.keep_playbooks_after_run),
            tool: other.tool.or(self.tool),
            marker_var: other.marker_var.or(self.marker_var),
            vault_password_env: other.vault_password_env.or(self.vault_password_env),
            missing_secret_policy: other.missing_secret_policy.or(self.missing_secret_policy),
            command_timeout_secs: other.command_timeout_secs.or(self.command_timeout_secs),
            exec_root: other.exec_root.or(self.exec_root),
            chroot_binary: other.chroot_binary.or(self.chroot_binary),
            unrecognised,
        }
    }
}
