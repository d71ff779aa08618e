//! Results handed back to the caller after a run.

use std::fmt;

use provisor_exec::CommandOutcome;
use provisor_fsops::{InventoryRecord, UnstageOutcome};
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::journal::StepRecord;
use crate::record::ProvisioningRecord;
use crate::state::{Phase, PipelineState};

/// A run that reached `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    /// Identifier correlating logs and journal entries.
    pub run_id: Uuid,
    /// Provenance metadata.
    pub record: ProvisioningRecord,
    /// Command result.
    pub outcome: CommandOutcome,
    /// Inventory written into the target; it persists after the run.
    pub inventory: InventoryRecord,
    /// What happened to the staged playbooks.
    pub playbooks: UnstageOutcome,
    /// Step journal.
    pub steps: Vec<StepRecord>,
    /// Every state entered, starting with `Idle`.
    pub states: Vec<PipelineState>,
    /// Final state (always `Done`).
    pub state: PipelineState,
}

/// A run that reached `Failed`.
#[derive(Debug)]
pub struct ProvisioningFailure {
    /// Identifier correlating logs and journal entries.
    pub run_id: Uuid,
    /// Phase in which the primary failure occurred.
    pub phase: Phase,
    /// Primary failure.
    pub error: PipelineError,
    /// Failures during cleanup that followed the primary failure.
    pub cleanup_errors: Vec<PipelineError>,
    /// Provenance metadata, when the record phase was reached.
    pub record: Option<ProvisioningRecord>,
    /// Command result, when the command ran to exit.
    pub outcome: Option<CommandOutcome>,
    /// Inventory, when it was written.
    pub inventory: Option<InventoryRecord>,
    /// Step journal.
    pub steps: Vec<StepRecord>,
    /// Every state entered, starting with `Idle` and ending with `Failed`.
    pub states: Vec<PipelineState>,
}

impl ProvisioningFailure {
    /// Exit code of the command, when it ran to exit.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.as_ref().map(|outcome| outcome.exit_code)
    }
}

impl fmt::Display for ProvisioningFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "provisioning failed during {}", self.phase)
    }
}

impl std::error::Error for ProvisioningFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
