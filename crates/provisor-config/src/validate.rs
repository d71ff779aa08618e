//! Field validation and resolution of layered documents into [`Options`].
//!
//! # Design
//! - Every rule returns a typed [`ConfigError`] naming the offending field.
//! - Resolution fills unset fields from [`crate::defaults`] before validating.

use std::path::{Component, Path, PathBuf};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{Options, OptionsDocument};

/// Resolve a merged document into validated options.
///
/// # Errors
///
/// Returns [`ConfigError::MissingField`] when the playbook source is unset and
/// [`ConfigError::InvalidField`] for any value that fails validation.
pub fn resolve(doc: OptionsDocument) -> ConfigResult<Options> {
    let playbooks_source_path = doc
        .playbooks_source_path
        .ok_or(ConfigError::MissingField {
            field: "playbooks_source_path",
        })?;
    validate_source_path(&playbooks_source_path)?;

    let playbooks_dest_relative_path = doc
        .playbooks_dest_relative_path
        .unwrap_or_else(|| PathBuf::from(defaults::PLAYBOOKS_DEST));
    validate_target_path("playbooks_dest_relative_path", &playbooks_dest_relative_path)?;
    if is_target_root(&playbooks_dest_relative_path) {
        return Err(ConfigError::invalid(
            "playbooks_dest_relative_path",
            "must not be the target root",
            Some(playbooks_dest_relative_path.display().to_string()),
        ));
    }

    let inventory_dir = doc
        .inventory_dir
        .unwrap_or_else(|| PathBuf::from(defaults::INVENTORY_DIR));
    validate_target_path("inventory_dir", &inventory_dir)?;

    let inventory_filename = doc
        .inventory_filename
        .unwrap_or_else(|| defaults::INVENTORY_FILENAME.to_string());
    validate_file_name("inventory_filename", &inventory_filename)?;

    let inventory_content = doc
        .inventory_content
        .unwrap_or_else(|| defaults::INVENTORY_CONTENT.to_string());

    let extra_vars = doc.extra_vars.unwrap_or_default();
    reject_nul("extra_vars", &extra_vars)?;

    let app_version = doc.app_version.unwrap_or_default();
    reject_nul("app_version", &app_version)?;

    let tool = doc.tool.unwrap_or_else(|| defaults::TOOL.to_string());
    validate_program("tool", &tool)?;

    let chroot_binary = doc
        .chroot_binary
        .unwrap_or_else(|| defaults::CHROOT_BINARY.to_string());
    validate_program("chroot_binary", &chroot_binary)?;

    let marker_var = doc
        .marker_var
        .unwrap_or_else(|| defaults::MARKER_VAR.to_string());
    validate_identifier("marker_var", &marker_var)?;

    let vault_password_env = doc
        .vault_password_env
        .unwrap_or_else(|| defaults::VAULT_PASSWORD_ENV.to_string());
    validate_env_name("vault_password_env", &vault_password_env)?;

    if doc.command_timeout_secs == Some(0) {
        return Err(ConfigError::invalid(
            "command_timeout_secs",
            "must be greater than zero",
            Some("0".to_string()),
        ));
    }

    Ok(Options {
        extra_vars,
        app_version,
        playbooks_source_path,
        playbooks_dest_relative_path,
        inventory_dir,
        inventory_filename,
        inventory_content,
        use_vault_password: doc.use_vault_password.unwrap_or(false),
        keep_playbooks_after_run: doc.keep_playbooks_after_run.unwrap_or(false),
        tool,
        marker_var,
        vault_password_env,
        missing_secret_policy: doc.missing_secret_policy.unwrap_or_default(),
        command_timeout_secs: doc.command_timeout_secs,
        exec_root: doc.exec_root.unwrap_or_default(),
        chroot_binary,
    })
}

fn validate_source_path(path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "playbooks_source_path",
            "must not be empty",
            None,
        ));
    }
    if !path.is_absolute() {
        return Err(ConfigError::invalid(
            "playbooks_source_path",
            "must be absolute",
            Some(path.display().to_string()),
        ));
    }
    Ok(())
}

/// Validate a path interpreted relative to the target root.
///
/// Leading `/` is tolerated; parent traversal is not.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for empty paths or paths containing `..`.
pub fn validate_target_path(field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty", None));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(ConfigError::invalid(
            field,
            "must not contain parent traversal",
            Some(path.display().to_string()),
        ));
    }
    Ok(())
}

fn is_target_root(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::RootDir | Component::CurDir))
}

fn validate_file_name(field: &'static str, name: &str) -> ConfigResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ConfigError::invalid(
            field,
            "must be a single file name",
            Some(name.to_string()),
        )),
    }
}

fn validate_program(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty", None));
    }
    reject_nul(field, value)
}

fn validate_identifier(field: &'static str, value: &str) -> ConfigResult<()> {
    let mut chars = value.chars();
    let valid_head = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if valid_head && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            "must be an identifier",
            Some(value.to_string()),
        ))
    }
}

fn validate_env_name(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty", None));
    }
    if value.contains('=') || value.contains('\0') {
        return Err(ConfigError::invalid(
            field,
            "must be a valid environment variable name",
            Some(value.to_string()),
        ));
    }
    Ok(())
}

fn reject_nul(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.contains('\0') {
        return Err(ConfigError::invalid(field, "must not contain NUL", None));
    }
    Ok(())
}
