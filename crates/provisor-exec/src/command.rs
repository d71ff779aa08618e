//! Argument-vector builder for the provisioning tool.
//!
//! # Design
//! - Each argument is a distinct argv element; no shell parses the command.
//! - `extra_vars` travels verbatim inside the single `-e` argument; the tool
//!   performs its own `key=value` splitting.
//! - `render` exists for logs and dry runs only.

use std::path::{Path, PathBuf};

use crate::error::{ExecError, ExecResult};

/// The tool invocation against staged artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookCommand {
    program: String,
    inventory: PathBuf,
    marker_var: String,
    extra_vars: String,
    playbook: PathBuf,
    vault_password_file: Option<PathBuf>,
}

impl PlaybookCommand {
    /// Invoke `program` with `inventory` against `playbook_dir/playbook_name`.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        inventory: impl Into<PathBuf>,
        playbook_dir: &Path,
        playbook_name: &str,
    ) -> Self {
        Self {
            program: program.into(),
            inventory: inventory.into(),
            marker_var: "ami".to_string(),
            extra_vars: String::new(),
            playbook: playbook_dir.join(playbook_name),
            vault_password_file: None,
        }
    }

    /// Variable passed as `<marker>=True` ahead of the extra vars.
    #[must_use]
    pub fn marker_var(mut self, marker: impl Into<String>) -> Self {
        self.marker_var = marker.into();
        self
    }

    /// Opaque `key=value` pairs appended after the marker.
    #[must_use]
    pub fn extra_vars(mut self, extra_vars: impl Into<String>) -> Self {
        self.extra_vars = extra_vars.into();
        self
    }

    /// Pass `--vault-password-file <path>` when set.
    #[must_use]
    pub fn vault_password_file(mut self, path: Option<PathBuf>) -> Self {
        self.vault_password_file = path;
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Playbook path passed as the final positional argument.
    #[must_use]
    pub fn playbook(&self) -> &Path {
        &self.playbook
    }

    /// Whether the vault option is present.
    #[must_use]
    pub const fn uses_vault(&self) -> bool {
        self.vault_password_file.is_some()
    }

    /// Full argument vector, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.program.clone(),
            "-c".to_string(),
            "local".to_string(),
            "-i".to_string(),
            path_arg(&self.inventory),
            "-e".to_string(),
            format!("{}=True {}", self.marker_var, self.extra_vars),
            path_arg(&self.playbook),
        ];
        if let Some(path) = &self.vault_password_file {
            argv.push("--vault-password-file".to_string());
            argv.push(path_arg(path));
        }
        argv
    }

    /// Shell-quoted rendering of [`Self::argv`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Render`] if an argument contains a NUL byte.
    pub fn render(&self) -> ExecResult<String> {
        render_argv(&self.argv())
    }
}

pub(crate) fn render_argv(argv: &[String]) -> ExecResult<String> {
    shlex::try_join(argv.iter().map(String::as_str)).map_err(|source| ExecError::Render { source })
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
