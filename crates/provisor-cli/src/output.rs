//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use provisor_app::{ProvisioningFailure, ProvisioningReport, StepRecord};
use provisor_config::Options;
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_report(report: &ProvisioningReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            println!("run: {}", report.run_id);
            println!("state: {}", report.state);
            println!("package: {}", report.record.name);
            if !report.record.version.is_empty() {
                println!("version: {}", report.record.version);
            }
            if !report.record.extra_vars.is_empty() {
                println!("extra vars: {}", report.record.extra_vars);
            }
            println!("exit code: {}", report.outcome.exit_code);
            println!("duration: {} ms", report.outcome.duration.as_millis());
            println!("inventory: {}", report.inventory.path.display());
            println!("playbooks: {}", report.playbooks.as_str());
            print_steps(&report.steps);
            Ok(())
        }
    }
}

pub(crate) fn render_failure(failure: &ProvisioningFailure, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&failure_json(failure)),
        OutputFormat::Table => {
            println!("run: {}", failure.run_id);
            println!("state: failed");
            println!("phase: {}", failure.phase);
            println!("error: {}", error_chain(&failure.error));
            for err in &failure.cleanup_errors {
                println!("cleanup error: {}", error_chain(err));
            }
            if let Some(outcome) = &failure.outcome {
                println!("exit code: {}", outcome.exit_code);
                let stderr = outcome.stderr.trim();
                if !stderr.is_empty() {
                    println!("stderr:");
                    for line in stderr.lines() {
                        println!("  {line}");
                    }
                }
            }
            if let Some(record) = &failure.record {
                println!("package: {}", record.name);
            }
            print_steps(&failure.steps);
            Ok(())
        }
    }
}

pub(crate) fn render_options(options: &Options, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(options),
        OutputFormat::Table => {
            let value = serde_json::to_value(options)
                .map_err(|err| CliError::failure(anyhow!("failed to format options: {err}")))?;
            if let Value::Object(fields) = value {
                for (key, field) in fields {
                    println!("{key}: {}", scalar(&field));
                }
            }
            Ok(())
        }
    }
}

fn print_steps(steps: &[StepRecord]) {
    if steps.is_empty() {
        return;
    }
    println!("{:<16} {:<10} DETAIL", "STEP", "STATUS");
    for step in steps {
        println!(
            "{:<16} {:<10} {}",
            step.step.as_str(),
            step.status.as_str(),
            step.detail.as_deref().unwrap_or("-")
        );
    }
}

fn failure_json(failure: &ProvisioningFailure) -> Value {
    json!({
        "run_id": failure.run_id,
        "state": "failed",
        "phase": failure.phase,
        "error": error_chain(&failure.error),
        "cleanup_errors": failure
            .cleanup_errors
            .iter()
            .map(|err| error_chain(err))
            .collect::<Vec<_>>(),
        "exit_code": failure.exit_code(),
        "record": failure.record,
        "outcome": failure.outcome,
        "inventory": failure.inventory,
        "steps": failure.steps,
        "states": failure.states,
    })
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) if text.is_empty() => "\"\"".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
