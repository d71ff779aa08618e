//! Lifecycle states and the phases that move between them.

use std::fmt;

use serde::Serialize;

/// Position of a pipeline in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has happened yet.
    Idle,
    /// Playbooks are staged in the target.
    Staged,
    /// Inventory and optional secret are in place.
    Configured,
    /// The command has run (successfully or not).
    Executing,
    /// Provenance metadata has been captured.
    Recorded,
    /// Secret and staged playbooks have been cleaned up.
    CleanedUp,
    /// Terminal: command succeeded and cleanup completed.
    Done,
    /// Terminal: some phase failed.
    Failed,
}

impl PipelineState {
    /// Stable label for logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staged => "staged",
            Self::Configured => "configured",
            Self::Executing => "executing",
            Self::Recorded => "recorded",
            Self::CleanedUp => "cleaned_up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Staged | Self::Failed)
                | (Self::Staged, Self::Configured | Self::CleanedUp | Self::Failed)
                | (Self::Configured, Self::Executing | Self::CleanedUp | Self::Failed)
                | (Self::Executing, Self::Recorded | Self::Failed)
                | (Self::Recorded, Self::CleanedUp)
                | (Self::CleanedUp, Self::Done | Self::Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lifecycle phase in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Request validation and playbook staging.
    Stage,
    /// Inventory and secret setup.
    Configure,
    /// Running the external command.
    Execute,
    /// Metadata capture.
    Record,
    /// Secret erasure and unstaging.
    Cleanup,
}

impl Phase {
    /// Stable label for logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Configure => "configure",
            Self::Execute => "execute",
            Self::Record => "record",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
