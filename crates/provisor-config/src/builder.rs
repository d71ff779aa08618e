//! Layered option assembly: defaults, then files, then explicit overrides.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::ConfigResult;
use crate::model::{Options, OptionsDocument};
use crate::validate;

/// Accumulates option documents in precedence order and resolves them.
#[derive(Debug, Default, Clone)]
pub struct OptionsBuilder {
    document: OptionsDocument,
}

impl OptionsBuilder {
    /// Start from built-in defaults only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay a YAML document read from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn with_file(self, path: &Path) -> ConfigResult<Self> {
        debug!(path = %path.display(), "loading options document");
        let document = OptionsDocument::from_path(path)?;
        Ok(self.with_document(document))
    }

    /// Overlay an in-memory document; its set fields win over earlier layers.
    #[must_use]
    pub fn with_document(self, document: OptionsDocument) -> Self {
        Self {
            document: self.document.merge(document),
        }
    }

    /// Validate the accumulated layers into immutable [`Options`].
    ///
    /// # Errors
    ///
    /// Returns the first validation failure encountered.
    pub fn resolve(self) -> ConfigResult<Options> {
        for key in self.document.unrecognised.keys() {
            warn!(key = %key, "ignoring unrecognised option");
        }
        validate::resolve(self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn later_layers_override_earlier_ones() {
        let options = OptionsBuilder::new()
            .with_document(OptionsDocument {
                playbooks_source_path: Some(PathBuf::from("/srv/a")),
                extra_vars: Some("x=1".into()),
                ..OptionsDocument::default()
            })
            .with_document(OptionsDocument {
                playbooks_source_path: Some(PathBuf::from("/srv/b")),
                ..OptionsDocument::default()
            })
            .resolve()
            .expect("layers resolve");
        assert_eq!(options.playbooks_source_path, PathBuf::from("/srv/b"));
        assert_eq!(options.extra_vars, "x=1");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = OptionsBuilder::new()
            .with_file(Path::new("/nonexistent/provisor/options.yml"))
            .unwrap_err();
        assert!(matches!(err, crate::ConfigError::Io { .. }));
    }
}
