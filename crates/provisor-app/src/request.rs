//! Inputs for a single provisioning run.

use std::path::{Component, Path, PathBuf};

use provisor_config::{ExecRoot, Options};
use provisor_exec::{CommandInvoker, PlaybookCommand};
use provisor_fsops::{TargetRoot, VAULT_PASSWORD_PATH};

use crate::error::{PipelineError, PipelineResult};

/// Immutable inputs for one run, owned by the caller and borrowed by the pipeline.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    /// Host path where the target root is mounted.
    pub target_mount_path: PathBuf,
    /// Playbook file name, relative to the staged playbook directory.
    pub package_identifier: String,
    /// Validated options.
    pub options: Options,
}

impl ProvisioningRequest {
    /// Bundle the run inputs.
    #[must_use]
    pub fn new(
        target_mount_path: impl Into<PathBuf>,
        package_identifier: impl Into<String>,
        options: Options,
    ) -> Self {
        Self {
            target_mount_path: target_mount_path.into(),
            package_identifier: package_identifier.into(),
            options,
        }
    }

    /// Check the request invariants that options validation cannot see.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRequest`] naming the offending field.
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.target_mount_path.is_absolute() {
            return Err(PipelineError::invalid_request(
                "target_mount_path",
                "must be absolute",
            ));
        }
        if !self.target_mount_path.is_dir() {
            return Err(PipelineError::invalid_request(
                "target_mount_path",
                "must be an existing directory",
            ));
        }
        let identifier = Path::new(&self.package_identifier);
        if self.package_identifier.trim().is_empty() {
            return Err(PipelineError::invalid_request(
                "package_identifier",
                "must not be empty",
            ));
        }
        if !identifier
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(PipelineError::invalid_request(
                "package_identifier",
                "must be a relative path without traversal",
            ));
        }
        Ok(())
    }

    /// Playbook destination as `(host path, in-target path)`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRequest`] when the destination escapes the target.
    pub fn playbook_destination(&self) -> PipelineResult<(PathBuf, PathBuf)> {
        let dest = &self.options.playbooks_dest_relative_path;
        let escapes = |_| {
            PipelineError::invalid_request(
                "playbooks_dest_relative_path",
                "must stay inside the target",
            )
        };
        let host = TargetRoot::new(&self.target_mount_path)
            .host_path(dest)
            .map_err(escapes)?;
        let in_target = TargetRoot::absolute(dest).map_err(escapes)?;
        Ok((host, in_target))
    }

    /// The invoker and command this request runs once staged.
    ///
    /// Paths are in-target for [`ExecRoot::Chroot`] and host paths for
    /// [`ExecRoot::Host`]. `with_vault` adds the vault password option.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRequest`] when a configured location
    /// escapes the target.
    pub fn command(&self, with_vault: bool) -> PipelineResult<(CommandInvoker, PlaybookCommand)> {
        let options = &self.options;
        let root = TargetRoot::new(&self.target_mount_path);
        let inventory = TargetRoot::absolute(&options.inventory_dir)
            .map_err(|_| {
                PipelineError::invalid_request("inventory_dir", "must stay inside the target")
            })?
            .join(&options.inventory_filename);
        let (playbooks_host, playbooks_in_target) = self.playbook_destination()?;
        let vault = PathBuf::from(VAULT_PASSWORD_PATH);

        let (invoker, inventory, playbooks, vault) = match options.exec_root {
            ExecRoot::Chroot => (
                CommandInvoker::chroot(options.chroot_binary.as_str(), &self.target_mount_path),
                inventory,
                playbooks_in_target,
                vault,
            ),
            ExecRoot::Host => {
                let outside = |_| {
                    PipelineError::invalid_request("inventory_dir", "must stay inside the target")
                };
                (
                    CommandInvoker::host(),
                    root.host_path(&inventory).map_err(outside)?,
                    playbooks_host,
                    root.host_path(&vault).map_err(outside)?,
                )
            }
        };

        let command = PlaybookCommand::new(
            options.tool.as_str(),
            inventory,
            &playbooks,
            &self.package_identifier,
        )
        .marker_var(options.marker_var.as_str())
        .extra_vars(options.extra_vars.as_str())
        .vault_password_file(with_vault.then_some(vault));
        Ok((invoker.with_timeout(options.command_timeout()), command))
    }
}
