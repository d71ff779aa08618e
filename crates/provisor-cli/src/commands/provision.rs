use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use provisor_app::{PipelineDeps, ProvisioningPipeline, ProvisioningRecord};
use provisor_exec::cancellation;
use provisor_fsops::EnvSecretSource;
use provisor_telemetry::Metrics;
use tracing::{info, warn};

use crate::cli::{CliContext, ProvisionArgs};
use crate::commands::build_request;
use crate::error::{CliError, CliResult};
use crate::output::{render_failure, render_report};

/// Run one provisioning request end to end. Ctrl-C cancels the running tool;
/// cleanup still happens before the process exits.
pub(crate) async fn handle_provision(ctx: &CliContext, args: ProvisionArgs) -> CliResult<()> {
    let request = build_request(ctx, args.target)?;
    let metrics = Metrics::new()
        .map_err(|err| CliError::failure(anyhow!(err).context("failed to build metrics registry")))?;
    let secret_source = EnvSecretSource::new(request.options.vault_password_env.as_str());

    let (handle, signal) = cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling provisioning command");
            handle.cancel();
        }
    });

    let deps =
        PipelineDeps::new(Arc::new(secret_source), metrics.clone()).with_cancellation(signal);
    let pipeline = ProvisioningPipeline::new(&request, deps);
    info!(run_id = %pipeline.run_id(), package = %request.package_identifier, "starting provisioning run");
    let result = pipeline.run().await;
    interrupt.abort();

    if let Some(path) = &args.metrics_textfile
        && let Err(err) = metrics.write_textfile(path)
    {
        warn!(error = %err, path = %path.display(), "failed to write metrics textfile");
    }

    match result {
        Ok(report) => {
            if let Some(path) = &args.record_out {
                write_record(path, &report.record).map_err(CliError::failure)?;
            }
            render_report(&report, ctx.output)
        }
        Err(failure) => {
            if let (Some(path), Some(record)) = (&args.record_out, &failure.record)
                && let Err(err) = write_record(path, record)
            {
                warn!(error = %format!("{err:#}"), "failed to write provisioning record");
            }
            render_failure(&failure, ctx.output)?;
            Err(CliError::from_failure(failure))
        }
    }
}

fn write_record(path: &Path, record: &ProvisioningRecord) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(record).context("failed to encode record")?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote provisioning record");
    Ok(())
}
