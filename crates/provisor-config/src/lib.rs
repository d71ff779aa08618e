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

//! Typed provisioning options resolved from layered documents.
//!
//! Layout: `model.rs` (option document and validated options), `validate.rs`
//! (field validation and resolution), `builder.rs` (layering of defaults, files
//! and overrides), `defaults.rs` (built-in defaults).

pub mod builder;
pub mod defaults;
pub mod error;
pub mod model;
pub mod validate;

pub use builder::OptionsBuilder;
pub use error::{ConfigError, ConfigResult};
pub use model::{ExecRoot, MissingSecretPolicy, Options, OptionsDocument};
