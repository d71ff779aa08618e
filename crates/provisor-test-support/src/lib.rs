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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (scratch target mounts and playbook trees), tool.rs (scripted
//! stand-in for the provisioning tool), assert.rs (tree comparison).

pub mod assert;
pub mod fixtures;
pub mod tool;
