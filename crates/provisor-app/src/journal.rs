//! Step journal for a single run.
//!
//! # Design
//! - Every status change is timestamped and mirrored into the
//!   `provision_steps_total` counter.
//! - The journal is returned to the caller; nothing is persisted.

use chrono::{DateTime, Utc};
use provisor_telemetry::Metrics;
use serde::Serialize;
use tracing::debug;

/// Individual lifecycle steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Request validation.
    ValidateRequest,
    /// Playbook staging.
    Stage,
    /// Inventory write.
    Inventory,
    /// Vault password staging.
    Secret,
    /// External command.
    Execute,
    /// Provenance capture.
    Record,
    /// Vault password removal.
    EraseSecret,
    /// Playbook removal.
    Unstage,
}

impl StepKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidateRequest => "validate_request",
            Self::Stage => "stage",
            Self::Inventory => "inventory",
            Self::Secret => "secret",
            Self::Execute => "execute",
            Self::Record => "record",
            Self::EraseSecret => "erase_secret",
            Self::Unstage => "unstage",
        }
    }
}

/// Status of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step began.
    Started,
    /// Step finished successfully.
    Completed,
    /// Step failed.
    Failed,
    /// Step was not needed.
    Skipped,
}

impl StepStatus {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Step the entry describes.
    pub step: StepKind,
    /// Status reached.
    pub status: StepStatus,
    /// Optional free-form detail; never contains secret material.
    pub detail: Option<String>,
    /// When the status was reached.
    pub updated_at: DateTime<Utc>,
}

pub(crate) struct Journal {
    metrics: Metrics,
    records: Vec<StepRecord>,
}

impl Journal {
    pub(crate) const fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            records: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, step: StepKind, status: StepStatus, detail: Option<String>) {
        debug!(
            step = step.as_str(),
            status = status.as_str(),
            detail = detail.as_deref().unwrap_or_default(),
            "provisioning step"
        );
        self.metrics.inc_provision_step(step.as_str(), status.as_str());
        self.records.push(StepRecord {
            step,
            status,
            detail,
            updated_at: Utc::now(),
        });
    }

    pub(crate) fn started(&mut self, step: StepKind) {
        self.record(step, StepStatus::Started, None);
    }

    pub(crate) fn completed(&mut self, step: StepKind, detail: Option<String>) {
        self.record(step, StepStatus::Completed, detail);
    }

    pub(crate) fn failed(&mut self, step: StepKind, error: &dyn std::error::Error) {
        self.record(step, StepStatus::Failed, Some(error.to_string()));
    }

    pub(crate) fn skipped(&mut self, step: StepKind, reason: &str) {
        self.record(step, StepStatus::Skipped, Some(reason.to_string()));
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn take(&mut self) -> Vec<StepRecord> {
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_records_and_counts_steps() -> provisor_telemetry::Result<()> {
        let metrics = Metrics::new()?;
        let mut journal = Journal::new(metrics.clone());
        journal.started(StepKind::Stage);
        journal.completed(StepKind::Stage, Some("4 files".into()));
        journal.skipped(StepKind::Secret, "not requested");

        let records = journal.take();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].status, StepStatus::Completed);
        assert_eq!(records[2].detail.as_deref(), Some("not requested"));
        assert_eq!(metrics.provision_step_count("stage", "completed"), 1);
        assert_eq!(metrics.provision_step_count("secret", "skipped"), 1);
        assert!(journal.take().is_empty());
        Ok(())
    }
}
