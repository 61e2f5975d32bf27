//! Error types for configuration loading.
//!
//! Configuration failures are startup-level: the engine refuses to construct
//! rather than running with a partially loaded document set. The two
//! externally meaningful kinds are `Missing` (a required document is absent)
//! and `Invalid` (a document parsed but failed validation); both map onto the
//! batch-mode exit code for configuration failures.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required document is absent from the configuration directory.
    #[error("config_missing: required document {0} not found")]
    Missing(String),

    /// A document was read but could not be parsed as YAML.
    #[error("config_invalid: {document}: {source}")]
    Parse {
        document: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A document parsed but violates a structural invariant.
    #[error("config_invalid: {document}: {reason}")]
    Validation { document: String, reason: String },

    /// The configuration directory itself could not be read.
    #[error("config_invalid: io error reading {document}: {source}")]
    Io {
        document: String,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied fingerprint does not match the loaded snapshot.
    #[error("config fingerprint mismatch: request carries {requested}, snapshot is {loaded}")]
    FingerprintMismatch { requested: String, loaded: String },
}

impl ConfigError {
    pub(crate) fn validation(document: &str, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            document: document.to_string(),
            reason: reason.into(),
        }
    }
}
