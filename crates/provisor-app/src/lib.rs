#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Chroot-scoped provisioning lifecycle.
//!
//! Layout: `request.rs` (run inputs), `state.rs` (lifecycle states and phases),
//! `journal.rs` (step journal and metrics), `record.rs` (provenance metadata),
//! `report.rs` (run results), `pipeline.rs` (the state machine), `error.rs`.

pub mod error;
pub mod journal;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod request;
pub mod state;

pub use error::{PipelineError, PipelineResult};
pub use journal::{StepKind, StepRecord, StepStatus};
pub use pipeline::{PipelineDeps, ProvisioningPipeline};
pub use record::{MetadataRecorder, ProvisioningRecord};
pub use report::{ProvisioningFailure, ProvisioningReport};
pub use request::ProvisioningRequest;
pub use state::{Phase, PipelineState};
