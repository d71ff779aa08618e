//! The provisioning state machine.
//!
//! # Design
//! - `pre_activation` stages playbooks; `provision` configures and runs the
//!   command; `finalize` records metadata and cleans up. `run` drives all three.
//! - A staging failure leaves nothing to clean up and fails immediately.
//! - A configuration failure reverses staging before failing.
//! - Command failures of any kind still proceed to record and cleanup; the
//!   terminal state is decided in `finalize`, always from `CleanedUp`.
//! - `finalize` and `run` consume the pipeline, so each instance serves one request.
//! - Dropping an unfinished pipeline releases the secret and staged playbooks.

use std::path::PathBuf;
use std::sync::Arc;

use provisor_config::MissingSecretPolicy;
use provisor_exec::{Cancellation, CommandInvoker, CommandOutcome, PlaybookCommand};
use provisor_fsops::{
    ArtifactStager, InventoryRecord, InventoryWriter, SecretError, SecretSource, SecretStage,
    StagedSecret, UnstageOutcome,
};
use provisor_telemetry::Metrics;
use tracing::{Instrument, Span, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::journal::{Journal, StepKind, StepStatus};
use crate::record::{MetadataRecorder, ProvisioningRecord};
use crate::report::{ProvisioningFailure, ProvisioningReport};
use crate::request::ProvisioningRequest;
use crate::state::{Phase, PipelineState};

/// Collaborators supplied by the caller.
#[derive(Clone)]
pub struct PipelineDeps {
    secret_source: Arc<dyn SecretSource>,
    metrics: Metrics,
    cancellation: Cancellation,
}

impl PipelineDeps {
    /// Dependencies with a signal that never cancels.
    #[must_use]
    pub fn new(secret_source: Arc<dyn SecretSource>, metrics: Metrics) -> Self {
        Self {
            secret_source,
            metrics,
            cancellation: Cancellation::never(),
        }
    }

    /// Use `cancellation` to abort a running command.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }
}

struct StagedPlaybooks {
    host_path: PathBuf,
    in_target_path: PathBuf,
}

/// Drives one [`ProvisioningRequest`] through the lifecycle.
pub struct ProvisioningPipeline<'a> {
    request: &'a ProvisioningRequest,
    deps: PipelineDeps,
    run_id: Uuid,
    span: Span,
    state: PipelineState,
    journal: Journal,
    stager: ArtifactStager,
    secrets: SecretStage,
    inventory_writer: InventoryWriter,
    recorder: MetadataRecorder,
    staged: Option<StagedPlaybooks>,
    inventory: Option<InventoryRecord>,
    secret: Option<StagedSecret>,
    outcome: Option<CommandOutcome>,
    exec_error: Option<PipelineError>,
    record: Option<ProvisioningRecord>,
    unstaged: Option<UnstageOutcome>,
    failure: Option<(Phase, PipelineError)>,
    cleanup_errors: Vec<PipelineError>,
    states: Vec<PipelineState>,
}

impl<'a> ProvisioningPipeline<'a> {
    /// Prepare a pipeline for `request`.
    #[must_use]
    pub fn new(request: &'a ProvisioningRequest, deps: PipelineDeps) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "provision_run",
            run_id = %run_id,
            package = %request.package_identifier
        );
        let journal = Journal::new(deps.metrics.clone());
        Self {
            request,
            deps,
            run_id,
            span,
            state: PipelineState::Idle,
            journal,
            stager: ArtifactStager::new(),
            secrets: SecretStage::new(),
            inventory_writer: InventoryWriter::new(),
            recorder: MetadataRecorder::new(),
            staged: None,
            inventory: None,
            secret: None,
            outcome: None,
            exec_error: None,
            record: None,
            unstaged: None,
            failure: None,
            cleanup_errors: Vec::new(),
            states: vec![PipelineState::Idle],
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drive the whole lifecycle.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisioningFailure`] naming the failed phase.
    pub async fn run(mut self) -> Result<ProvisioningReport, ProvisioningFailure> {
        if self.pre_activation().is_ok() {
            let _ = self.provision().await;
        }
        self.finalize()
    }

    /// `Idle -> Staged`: validate the request and stage playbooks.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure; the pipeline is then `Failed` with nothing
    /// to clean up.
    pub fn pre_activation(&mut self) -> Result<(), &PipelineError> {
        let _entered = self.span.clone().entered();
        if self.expect_state(PipelineState::Idle, "pre_activation", Phase::Stage) {
            if let Err(err) = self.stage() {
                self.fail(Phase::Stage, err);
            } else {
                self.transition(PipelineState::Staged);
            }
        }
        self.status()
    }

    /// `Staged -> Configured -> Executing`: write inventory and secret, then run
    /// the command.
    ///
    /// A command that exits non-zero, fails to launch, times out or is cancelled
    /// does not fail this call; `finalize` reports it after cleanup.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure when configuration failed; staging has then
    /// already been reversed.
    pub async fn provision(&mut self) -> Result<(), &PipelineError> {
        let span = self.span.clone();
        self.configure_and_execute().instrument(span).await;
        self.status()
    }

    /// `Executing -> Recorded -> CleanedUp -> Done | Failed`: record metadata and
    /// clean up regardless of the command outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisioningFailure`] when any phase failed, including a
    /// command that exited non-zero.
    pub fn finalize(mut self) -> Result<ProvisioningReport, ProvisioningFailure> {
        let _entered = self.span.clone().entered();
        match self.state {
            PipelineState::Executing => self.record_and_clean(),
            PipelineState::Failed => self.release_resources(),
            other => {
                self.fail(
                    phase_for(other),
                    PipelineError::InvalidTransition {
                        from: other,
                        operation: "finalize",
                    },
                );
                self.release_resources();
            }
        }
        self.conclude()
    }

    fn stage(&mut self) -> PipelineResult<()> {
        let request = self.request;
        let options = &request.options;

        self.journal.started(StepKind::ValidateRequest);
        let validated = request.validate().and_then(|()| {
            let (host_path, in_target_path) = request.playbook_destination()?;
            Ok(StagedPlaybooks {
                host_path,
                in_target_path,
            })
        });
        let destination = match validated {
            Ok(destination) => {
                self.journal.completed(StepKind::ValidateRequest, None);
                destination
            }
            Err(err) => {
                self.journal.failed(StepKind::ValidateRequest, &err);
                return Err(err);
            }
        };

        self.journal.started(StepKind::Stage);
        match self
            .stager
            .stage(&options.playbooks_source_path, &destination.host_path)
        {
            Ok(()) => {
                self.journal.completed(
                    StepKind::Stage,
                    Some(destination.in_target_path.display().to_string()),
                );
                self.staged = Some(destination);
                Ok(())
            }
            Err(source) => {
                let err = PipelineError::Stage { source };
                self.journal.failed(StepKind::Stage, &err);
                Err(err)
            }
        }
    }

    async fn configure_and_execute(&mut self) {
        if !self.expect_state(PipelineState::Staged, "provision", Phase::Configure) {
            return;
        }
        if let Err(err) = self.configure() {
            self.release_resources();
            self.transition(PipelineState::CleanedUp);
            self.fail(Phase::Configure, err);
            return;
        }
        self.transition(PipelineState::Configured);

        match self.build_command() {
            Ok((invoker, command)) => {
                self.transition(PipelineState::Executing);
                self.execute(&invoker, &command).await;
            }
            Err(err) => {
                self.release_resources();
                self.transition(PipelineState::CleanedUp);
                self.fail(Phase::Execute, err);
            }
        }
    }

    fn configure(&mut self) -> PipelineResult<()> {
        let request = self.request;
        let options = &request.options;

        self.journal.started(StepKind::Inventory);
        match self.inventory_writer.write(
            &request.target_mount_path,
            &options.inventory_dir,
            &options.inventory_filename,
            &options.inventory_content,
        ) {
            Ok(record) => {
                self.journal
                    .completed(StepKind::Inventory, Some(record.path.display().to_string()));
                self.inventory = Some(record);
            }
            Err(source) => {
                let err = PipelineError::Inventory { source };
                self.journal.failed(StepKind::Inventory, &err);
                return Err(err);
            }
        }

        if !options.use_vault_password {
            self.journal.skipped(StepKind::Secret, "not requested");
            return Ok(());
        }
        self.journal.started(StepKind::Secret);
        match self
            .secrets
            .write_from_source(&request.target_mount_path, self.deps.secret_source.as_ref())
        {
            Ok(staged) => {
                self.journal.completed(StepKind::Secret, None);
                self.secret = Some(staged);
                Ok(())
            }
            Err(SecretError::SourceMissing { source_name })
                if options.missing_secret_policy == MissingSecretPolicy::Continue =>
            {
                warn!(
                    source = %source_name,
                    "vault password unavailable; running without vault option"
                );
                self.journal.skipped(StepKind::Secret, "secret source missing");
                Ok(())
            }
            Err(source) => {
                let err = PipelineError::Secret { source };
                self.journal.failed(StepKind::Secret, &err);
                Err(err)
            }
        }
    }

    fn build_command(&self) -> PipelineResult<(CommandInvoker, PlaybookCommand)> {
        if self.inventory.is_none() || self.staged.is_none() {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                operation: "provision",
            });
        }
        self.request.command(self.secret.is_some())
    }

    async fn execute(&mut self, invoker: &CommandInvoker, command: &PlaybookCommand) {
        self.journal.started(StepKind::Execute);
        let result = invoker.run(command, &self.deps.cancellation).await;
        match result {
            Ok(outcome) => {
                self.journal
                    .metrics()
                    .observe_command(outcome.duration, outcome.exit_code);
                let status = if outcome.succeeded {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                };
                self.journal.record(
                    StepKind::Execute,
                    status,
                    Some(format!("exit code {}", outcome.exit_code)),
                );
                self.outcome = Some(outcome);
            }
            Err(source) => {
                let err = PipelineError::Exec { source };
                self.journal.failed(StepKind::Execute, &err);
                error!(error = %err, "provisioning command did not complete");
                self.exec_error = Some(err);
            }
        }
    }

    fn record_and_clean(&mut self) {
        self.journal.started(StepKind::Record);
        let record = self.recorder.record(self.request);
        info!(
            name = %record.name,
            version = %record.version,
            "recorded provisioning metadata"
        );
        self.journal.completed(StepKind::Record, None);
        self.record = Some(record);
        self.transition(PipelineState::Recorded);

        self.release_resources();
        self.transition(PipelineState::CleanedUp);

        if let Some(err) = self.exec_error.take() {
            self.fail(Phase::Execute, err);
            return;
        }
        if let Some(outcome) = self.outcome.as_ref().filter(|outcome| !outcome.succeeded) {
            let err = PipelineError::CommandFailed {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr.clone(),
            };
            self.fail(Phase::Execute, err);
            return;
        }
        if !self.cleanup_errors.is_empty() {
            let primary = self.cleanup_errors.remove(0);
            self.fail(Phase::Cleanup, primary);
        }
    }

    /// Erase the secret, then unstage unless kept. Both are attempted; failures
    /// are collected in `cleanup_errors`.
    fn release_resources(&mut self) {
        if let Some(secret) = self.secret.take() {
            self.journal.started(StepKind::EraseSecret);
            match self.secrets.erase(secret) {
                Ok(()) => self.journal.completed(StepKind::EraseSecret, None),
                Err(source) => {
                    let err = PipelineError::EraseSecret { source };
                    self.journal.failed(StepKind::EraseSecret, &err);
                    error!(error = %err, "failed to erase vault password file");
                    self.cleanup_errors.push(err);
                }
            }
        }

        if let Some(staged) = self.staged.take() {
            let keep = self.request.options.keep_playbooks_after_run;
            self.journal.started(StepKind::Unstage);
            match self.stager.unstage(&staged.host_path, keep) {
                Ok(outcome) => {
                    self.journal
                        .completed(StepKind::Unstage, Some(outcome.as_str().to_string()));
                    self.unstaged = Some(outcome);
                }
                Err(source) => {
                    let err = PipelineError::Unstage { source };
                    self.journal.failed(StepKind::Unstage, &err);
                    error!(error = %err, "failed to remove staged playbooks");
                    self.cleanup_errors.push(err);
                }
            }
        }
    }

    fn conclude(&mut self) -> Result<ProvisioningReport, ProvisioningFailure> {
        let metrics = self.journal.metrics().clone();
        if self.failure.is_none() {
            match (self.outcome.take(), self.inventory.take(), self.record.take()) {
                (Some(outcome), Some(inventory), Some(record)) => {
                    self.transition(PipelineState::Done);
                    metrics.inc_provision_run("succeeded");
                    info!(exit_code = outcome.exit_code, "provisioning run succeeded");
                    return Ok(ProvisioningReport {
                        run_id: self.run_id,
                        record,
                        outcome,
                        inventory,
                        playbooks: self.unstaged.unwrap_or(UnstageOutcome::AlreadyAbsent),
                        steps: self.journal.take(),
                        states: std::mem::take(&mut self.states),
                        state: self.state,
                    });
                }
                (outcome, inventory, record) => {
                    self.outcome = outcome;
                    self.inventory = inventory;
                    self.record = record;
                    self.fail(
                        Phase::Record,
                        PipelineError::InvalidTransition {
                            from: self.state,
                            operation: "finalize",
                        },
                    );
                }
            }
        }

        metrics.inc_provision_run("failed");
        let (phase, error) = self.failure.take().unwrap_or((
            Phase::Cleanup,
            PipelineError::InvalidTransition {
                from: self.state,
                operation: "finalize",
            },
        ));
        Err(ProvisioningFailure {
            run_id: self.run_id,
            phase,
            error,
            cleanup_errors: std::mem::take(&mut self.cleanup_errors),
            record: self.record.take(),
            outcome: self.outcome.take(),
            inventory: self.inventory.take(),
            steps: self.journal.take(),
            states: std::mem::take(&mut self.states),
        })
    }

    fn expect_state(
        &mut self,
        expected: PipelineState,
        operation: &'static str,
        phase: Phase,
    ) -> bool {
        if self.state == expected {
            return true;
        }
        if self.state != PipelineState::Failed {
            let from = self.state;
            self.fail(phase, PipelineError::InvalidTransition { from, operation });
        }
        false
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.states.push(next);
    }

    fn fail(&mut self, phase: Phase, err: PipelineError) {
        error!(phase = %phase, error = %err, "provisioning phase failed");
        if self.failure.is_none() {
            self.failure = Some((phase, err));
        } else {
            self.cleanup_errors.push(err);
        }
        if !self.state.is_terminal() {
            self.transition(PipelineState::Failed);
        }
    }

    const fn status(&self) -> Result<(), &PipelineError> {
        match &self.failure {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ProvisioningPipeline<'_> {
    fn drop(&mut self) {
        if self.secret.is_some() || self.staged.is_some() {
            let _entered = self.span.clone().entered();
            warn!("pipeline dropped before finalize; releasing resources");
            self.release_resources();
        }
    }
}

const fn phase_for(state: PipelineState) -> Phase {
    match state {
        PipelineState::Idle => Phase::Stage,
        PipelineState::Staged => Phase::Configure,
        PipelineState::Configured | PipelineState::Executing => Phase::Execute,
        PipelineState::Recorded => Phase::Record,
        PipelineState::CleanedUp | PipelineState::Done | PipelineState::Failed => Phase::Cleanup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisor_config::{ExecRoot, OptionsBuilder, OptionsDocument};
    use provisor_fsops::StaticSecretSource;
    use tempfile::TempDir;

    fn deps() -> PipelineDeps {
        PipelineDeps::new(
            Arc::new(StaticSecretSource::absent()),
            Metrics::new().expect("metrics"),
        )
    }

    fn request(mount: &TempDir, source: PathBuf) -> ProvisioningRequest {
        let options = OptionsBuilder::new()
            .with_document(OptionsDocument {
                playbooks_source_path: Some(source),
                exec_root: Some(ExecRoot::Host),
                ..OptionsDocument::default()
            })
            .resolve()
            .expect("options");
        ProvisioningRequest::new(mount.path(), "site.yml", options)
    }

    #[test]
    fn finalize_before_provision_cleans_up_and_fails() {
        let mount = TempDir::new().expect("mount");
        let host = TempDir::new().expect("host");
        let source = host.path().join("playbooks");
        std::fs::create_dir_all(&source).expect("source");
        std::fs::write(source.join("site.yml"), "- hosts: all\n").expect("playbook");
        let request = request(&mount, source);

        let mut pipeline = ProvisioningPipeline::new(&request, deps());
        assert!(pipeline.pre_activation().is_ok());
        assert_eq!(pipeline.state(), PipelineState::Staged);
        assert!(mount.path().join("var/lib/ansible/playbooks/site.yml").exists());

        let failure = pipeline.finalize().expect_err("finalize from staged must fail");
        assert_eq!(failure.phase, Phase::Configure);
        assert!(matches!(
            failure.error,
            PipelineError::InvalidTransition {
                from: PipelineState::Staged,
                operation: "finalize"
            }
        ));
        assert!(!mount.path().join("var/lib/ansible/playbooks").exists());
    }

    #[test]
    fn repeated_pre_activation_is_rejected() {
        let mount = TempDir::new().expect("mount");
        let host = TempDir::new().expect("host");
        let source = host.path().join("playbooks");
        std::fs::create_dir_all(&source).expect("source");
        let request = request(&mount, source);

        let mut pipeline = ProvisioningPipeline::new(&request, deps());
        assert!(pipeline.pre_activation().is_ok());
        assert!(matches!(
            pipeline.pre_activation(),
            Err(PipelineError::InvalidTransition {
                from: PipelineState::Staged,
                operation: "pre_activation"
            })
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn dropping_staged_pipeline_removes_playbooks() {
        let mount = TempDir::new().expect("mount");
        let host = TempDir::new().expect("host");
        let source = host.path().join("playbooks");
        std::fs::create_dir_all(&source).expect("source");
        let request = request(&mount, source);

        {
            let mut pipeline = ProvisioningPipeline::new(&request, deps());
            assert!(pipeline.pre_activation().is_ok());
        }
        assert!(!mount.path().join("var/lib/ansible/playbooks").exists());
    }
}
