#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use provisor_app::{
    PipelineDeps, PipelineError, PipelineState, Phase, ProvisioningPipeline, ProvisioningRequest,
    StepKind, StepStatus,
};
use provisor_config::{ExecRoot, MissingSecretPolicy, OptionsBuilder, OptionsDocument};
use provisor_exec::{ExecError, cancellation};
use provisor_fsops::{
    SecretError, SecretSource, StaticSecretSource, StageError, UnstageOutcome,
};
use provisor_telemetry::Metrics;
use provisor_test_support::assert::assert_trees_identical;
use provisor_test_support::fixtures::ScratchTarget;
use provisor_test_support::tool::{FakeTool, ToolScript};
use serial_test::serial;

const PLAYBOOKS_DEST: &str = "/var/lib/ansible/playbooks";
const VAULT_FILE: &str = "/tmp/vault_password";

const FAILED_AFTER_EXECUTE: [PipelineState; 7] = [
    PipelineState::Idle,
    PipelineState::Staged,
    PipelineState::Configured,
    PipelineState::Executing,
    PipelineState::Recorded,
    PipelineState::CleanedUp,
    PipelineState::Failed,
];

struct Harness {
    target: ScratchTarget,
    tool: FakeTool,
    source: PathBuf,
}

impl Harness {
    fn new(script: &ToolScript) -> Result<Self> {
        let target = ScratchTarget::new()?;
        let source = target.playbooks()?;
        let tool = FakeTool::install(target.host(), script)?;
        Ok(Self {
            target,
            tool,
            source,
        })
    }

    fn document(&self) -> Result<OptionsDocument> {
        Ok(OptionsDocument {
            playbooks_source_path: Some(self.source.clone()),
            tool: Some(self.tool.program_str()?),
            exec_root: Some(ExecRoot::Host),
            ..OptionsDocument::default()
        })
    }

    fn request(&self, document: OptionsDocument) -> Result<ProvisioningRequest> {
        let options = OptionsBuilder::new().with_document(document).resolve()?;
        Ok(ProvisioningRequest::new(
            self.target.mount(),
            "site.yml",
            options,
        ))
    }
}

fn deps(source: impl SecretSource + 'static) -> Result<(PipelineDeps, Metrics)> {
    let metrics = Metrics::new()?;
    Ok((PipelineDeps::new(Arc::new(source), metrics.clone()), metrics))
}

#[tokio::test]
#[serial]
async fn successful_run_records_metadata_and_removes_playbooks() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.app_version = Some("1.4.2".into());
    let request = harness.request(document)?;
    let (deps, metrics) = deps(StaticSecretSource::absent())?;

    let report = ProvisioningPipeline::new(&request, deps)
        .run()
        .await
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.outcome.exit_code, 0);
    assert_eq!(report.record.name, "site.yml");
    assert_eq!(report.record.version, "1.4.2");
    assert_eq!(report.record.release, "");
    assert_eq!(report.playbooks, UnstageOutcome::Removed);

    let inventory = harness.target.in_target("/etc/ansible/hosts");
    let staged = harness.target.in_target(PLAYBOOKS_DEST);
    assert_eq!(
        harness.tool.recorded_args()?,
        [
            "-c".to_string(),
            "local".to_string(),
            "-i".to_string(),
            inventory.display().to_string(),
            "-e".to_string(),
            "ami=True ".to_string(),
            staged.join("site.yml").display().to_string(),
        ]
    );
    assert!(harness.tool.saw_playbook());
    assert!(!staged.exists());
    assert_eq!(fs::read_to_string(&inventory)?, "127.0.0.1");
    assert_eq!(report.inventory.path, PathBuf::from("/etc/ansible/hosts"));
    assert!(
        report
            .steps
            .iter()
            .any(|step| step.step == StepKind::Secret && step.status == StepStatus::Skipped)
    );
    assert_eq!(metrics.provision_step_count("execute", "completed"), 1);
    assert_eq!(metrics.snapshot().command_exit_code, 0);
    assert_eq!(
        report.states,
        [
            PipelineState::Idle,
            PipelineState::Staged,
            PipelineState::Configured,
            PipelineState::Executing,
            PipelineState::Recorded,
            PipelineState::CleanedUp,
            PipelineState::Done,
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn existing_destination_fails_without_touching_target() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let staged = harness.target.in_target(PLAYBOOKS_DEST);
    fs::create_dir_all(&staged)?;
    fs::write(staged.join("previous.yml"), "keep me")?;
    let request = harness.request(harness.document()?)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("staging over an existing destination must fail"));
    };

    assert_eq!(failure.phase, Phase::Stage);
    assert!(matches!(
        failure.error,
        PipelineError::Stage {
            source: StageError::DestinationExists { .. }
        }
    ));
    assert!(failure.cleanup_errors.is_empty());
    assert!(failure.record.is_none());
    assert!(!harness.tool.was_invoked());
    assert_eq!(fs::read_to_string(staged.join("previous.yml"))?, "keep me");
    assert!(!harness.target.in_target("/etc/ansible/hosts").exists());
    assert!(
        !failure
            .steps
            .iter()
            .any(|step| step.step == StepKind::Unstage)
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn missing_source_fails_before_any_mutation() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.playbooks_source_path = Some(harness.target.host().join("absent"));
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("missing source must fail"));
    };

    assert!(matches!(
        failure.error,
        PipelineError::Stage {
            source: StageError::SourceMissing { .. }
        }
    ));
    assert_eq!(fs::read_dir(harness.target.mount())?.count(), 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn vault_password_reaches_tool_and_is_erased() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::present("s3cret"))?;

    let report = ProvisioningPipeline::new(&request, deps)
        .run()
        .await
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;

    assert_eq!(report.state, PipelineState::Done);
    let args = harness.tool.recorded_args()?;
    let vault = harness.target.in_target(VAULT_FILE);
    assert_eq!(args[args.len() - 2], "--vault-password-file");
    assert_eq!(args[args.len() - 1], vault.display().to_string());
    assert_eq!(harness.tool.captured_secret().as_deref(), Some("s3cret"));
    assert!(!vault.exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn missing_secret_aborts_under_default_policy() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("missing secret must abort"));
    };

    assert_eq!(failure.phase, Phase::Configure);
    assert!(matches!(failure.error, PipelineError::Secret { .. }));
    assert!(!harness.tool.was_invoked());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    assert!(!harness.target.in_target(VAULT_FILE).exists());
    assert_eq!(
        failure.states,
        [
            PipelineState::Idle,
            PipelineState::Staged,
            PipelineState::CleanedUp,
            PipelineState::Failed,
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn symlinked_vault_path_aborts_without_leaking_secret() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let outside = harness.target.host().join("outside-secret");
    fs::write(&outside, "host data")?;
    let link = harness.target.in_target(VAULT_FILE);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(&outside, &link)?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::present("s3cret"))?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("occupied vault path must abort"));
    };

    assert_eq!(failure.phase, Phase::Configure);
    assert!(matches!(
        failure.error,
        PipelineError::Secret {
            source: SecretError::DestinationExists { .. }
        }
    ));
    assert_eq!(fs::read_to_string(&outside)?, "host data");
    assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
    assert!(!harness.tool.was_invoked());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn missing_secret_continues_without_vault_option() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    document.missing_secret_policy = Some(MissingSecretPolicy::Continue);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let report = ProvisioningPipeline::new(&request, deps)
        .run()
        .await
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;

    assert_eq!(report.state, PipelineState::Done);
    assert!(
        !harness
            .tool
            .recorded_args()?
            .iter()
            .any(|arg| arg == "--vault-password-file")
    );
    assert!(!harness.target.in_target(VAULT_FILE).exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn non_zero_exit_records_and_cleans_before_failing() -> Result<()> {
    let harness = Harness::new(&ToolScript::failing(2, "TASK [common] failed"))?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    document.extra_vars = Some("env=prod".into());
    let request = harness.request(document)?;
    let (deps, metrics) = deps(StaticSecretSource::present("pw"))?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("non-zero exit must fail the run"));
    };

    assert_eq!(failure.phase, Phase::Execute);
    match &failure.error {
        PipelineError::CommandFailed { exit_code, stderr } => {
            assert_eq!(*exit_code, 2);
            assert!(stderr.contains("TASK [common] failed"));
        }
        other => return Err(anyhow!("unexpected error {other:?}")),
    }
    assert_eq!(failure.exit_code(), Some(2));
    let record = failure
        .record
        .as_ref()
        .ok_or_else(|| anyhow!("record missing"))?;
    assert_eq!(record.extra_vars, "env=prod");
    assert!(failure.cleanup_errors.is_empty());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    assert!(!harness.target.in_target(VAULT_FILE).exists());
    assert!(harness.target.in_target("/etc/ansible/hosts").exists());
    assert_eq!(metrics.snapshot().command_exit_code, 2);
    assert_eq!(failure.states, FAILED_AFTER_EXECUTE);

    let order: Vec<StepKind> = failure
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Completed)
        .map(|step| step.step)
        .collect();
    assert_eq!(
        order,
        [
            StepKind::ValidateRequest,
            StepKind::Stage,
            StepKind::Inventory,
            StepKind::Secret,
            StepKind::Record,
            StepKind::EraseSecret,
            StepKind::Unstage,
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn launch_failure_still_cleans_up() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.tool = Some(
        harness
            .target
            .host()
            .join("no-such-tool")
            .display()
            .to_string(),
    );
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("launch failure must fail the run"));
    };

    assert_eq!(failure.phase, Phase::Execute);
    assert!(matches!(
        failure.error,
        PipelineError::Exec {
            source: ExecError::LaunchFailed { .. }
        }
    ));
    assert!(failure.record.is_some());
    assert!(failure.outcome.is_none());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    assert_eq!(failure.states, FAILED_AFTER_EXECUTE);
    Ok(())
}

#[tokio::test]
#[serial]
async fn timeout_kills_command_and_cleans_up() -> Result<()> {
    let harness = Harness::new(&ToolScript::sleeping(30))?;
    let mut document = harness.document()?;
    document.command_timeout_secs = Some(1);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let Err(failure) = ProvisioningPipeline::new(&request, deps).run().await else {
        return Err(anyhow!("timed out command must fail the run"));
    };

    assert!(matches!(
        failure.error,
        PipelineError::Exec {
            source: ExecError::TimedOut { .. }
        }
    ));
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    assert_eq!(failure.states, FAILED_AFTER_EXECUTE);
    Ok(())
}

#[tokio::test]
#[serial]
async fn cancellation_while_running_kills_command_and_cleans_up() -> Result<()> {
    let harness = Harness::new(&ToolScript::sleeping(30))?;
    let mut document = harness.document()?;
    document.use_vault_password = Some(true);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::present("pw"))?;
    let (handle, signal) = cancellation();

    let tool = harness.tool.clone();
    let canceller = tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !tool.was_invoked() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.cancel();
    });

    let started = Instant::now();
    let result = ProvisioningPipeline::new(&request, deps.with_cancellation(signal))
        .run()
        .await;
    canceller.await?;
    let Err(failure) = result else {
        return Err(anyhow!("cancelled run must fail"));
    };

    assert!(harness.tool.was_invoked());
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(failure.phase, Phase::Execute);
    assert!(matches!(
        failure.error,
        PipelineError::Exec {
            source: ExecError::Cancelled { .. }
        }
    ));
    assert!(failure.record.is_some());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    assert!(!harness.target.in_target(VAULT_FILE).exists());
    assert_eq!(failure.states, FAILED_AFTER_EXECUTE);
    Ok(())
}

#[tokio::test]
#[serial]
async fn cancellation_before_execute_skips_launch() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let request = harness.request(harness.document()?)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;
    let (handle, signal) = cancellation();
    handle.cancel();

    let Err(failure) = ProvisioningPipeline::new(&request, deps.with_cancellation(signal))
        .run()
        .await
    else {
        return Err(anyhow!("cancelled run must fail"));
    };

    assert!(matches!(
        failure.error,
        PipelineError::Exec {
            source: ExecError::Cancelled { .. }
        }
    ));
    assert!(!harness.tool.was_invoked());
    assert!(!harness.target.in_target(PLAYBOOKS_DEST).exists());
    Ok(())
}

#[tokio::test]
#[serial]
async fn kept_playbooks_match_source() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let mut document = harness.document()?;
    document.keep_playbooks_after_run = Some(true);
    let request = harness.request(document)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let report = ProvisioningPipeline::new(&request, deps)
        .run()
        .await
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;

    assert_eq!(report.playbooks, UnstageOutcome::Kept);
    assert_trees_identical(&harness.source, &harness.target.in_target(PLAYBOOKS_DEST))?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn stepwise_lifecycle_reports_states() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let request = harness.request(harness.document()?)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let mut pipeline = ProvisioningPipeline::new(&request, deps);
    assert_eq!(pipeline.state(), PipelineState::Idle);
    pipeline
        .pre_activation()
        .map_err(|err| anyhow!("pre_activation: {err}"))?;
    assert_eq!(pipeline.state(), PipelineState::Staged);
    pipeline
        .provision()
        .await
        .map_err(|err| anyhow!("provision: {err}"))?;
    assert_eq!(pipeline.state(), PipelineState::Executing);
    let run_id = pipeline.run_id();

    let report = pipeline
        .finalize()
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.state, PipelineState::Done);
    Ok(())
}

#[tokio::test]
#[serial]
async fn report_serialises_to_json() -> Result<()> {
    let harness = Harness::new(&ToolScript::succeeding())?;
    let request = harness.request(harness.document()?)?;
    let (deps, _metrics) = deps(StaticSecretSource::absent())?;

    let report = ProvisioningPipeline::new(&request, deps)
        .run()
        .await
        .map_err(|failure| anyhow!("{failure}: {}", failure.error))?;
    let value = serde_json::to_value(&report)?;

    assert_eq!(value["state"], "done");
    assert_eq!(value["record"]["name"], "site.yml");
    assert_eq!(value["playbooks"], "removed");
    assert!(value["outcome"]["duration_ms"].is_u64());
    Ok(())
}
