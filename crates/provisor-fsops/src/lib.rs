//! Filesystem operations against a mounted, not-yet-booted target root.
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

//! Layout: `paths.rs` (in-target to host path mapping), `stager.rs` (reversible
//! playbook staging), `secret.rs` (vault password lifetime), `inventory.rs`
//! (inventory materialisation), `error.rs` (typed failures).

pub mod error;
pub mod inventory;
pub mod paths;
pub mod secret;
pub mod stager;

pub use error::{
    InventoryError, InventoryResult, SecretError, SecretResult, StageError, StageResult,
    TargetPathError,
};
pub use inventory::{InventoryRecord, InventoryWriter};
pub use paths::TargetRoot;
pub use secret::{
    EnvSecretSource, SecretSource, SecretStage, SecretValue, StagedSecret, StaticSecretSource,
    VAULT_PASSWORD_PATH,
};
pub use stager::{ArtifactStager, UnstageOutcome};
