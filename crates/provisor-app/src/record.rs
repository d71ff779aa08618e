//! Provenance metadata for a provisioning run.

use serde::{Deserialize, Serialize};

use crate::request::ProvisioningRequest;

/// What was provisioned, with which parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    /// Package identifier (the playbook that was run).
    pub name: String,
    /// Application version supplied by the caller.
    pub version: String,
    /// Release label; always empty.
    pub release: String,
    /// Extra variables passed to the tool.
    pub extra_vars: String,
}

/// Captures a [`ProvisioningRecord`] from a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataRecorder;

impl MetadataRecorder {
    /// Construct a recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the record. Independent of the command outcome.
    #[must_use]
    pub fn record(&self, request: &ProvisioningRequest) -> ProvisioningRecord {
        ProvisioningRecord {
            name: request.package_identifier.clone(),
            version: request.options.app_version.clone(),
            release: String::new(),
            extra_vars: request.options.extra_vars.clone(),
        }
    }
}
