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

//! Construction and execution of the external provisioning command.
//!
//! Layout: `command.rs` (argument-vector builder), `invoker.rs` (process
//! execution with timeout and cancellation), `cancel.rs` (cancellation
//! signal), `error.rs` (execution failures).

pub mod cancel;
pub mod command;
pub mod error;
pub mod invoker;

pub use cancel::{CancelHandle, Cancellation, cancellation};
pub use command::PlaybookCommand;
pub use error::{ExecError, ExecResult};
pub use invoker::{CommandInvoker, CommandOutcome};
