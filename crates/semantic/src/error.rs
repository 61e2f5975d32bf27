//! Error types for the semantic retrieval layer.

use thiserror::Error;

/// Errors produced while loading or querying the embedding index.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// An index artifact is missing or unreadable.
    #[error("semantic index io error for {artifact}: {source}")]
    Io {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest or metadata file could not be parsed.
    #[error("semantic index parse error for {artifact}: {source}")]
    Parse {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored digest does not match the artifact on disk.
    #[error("semantic index checksum mismatch for {artifact}: stored {stored}, computed {computed}")]
    ChecksumMismatch {
        artifact: String,
        stored: String,
        computed: String,
    },

    /// The vectors file length disagrees with the manifest geometry.
    #[error("semantic index geometry mismatch: expected {expected} f32 values, found {found}")]
    Geometry { expected: usize, found: usize },

    /// A branded entry appeared in what must be a foundation+legacy index.
    #[error("semantic index contains branded row {fdc_id}; index must be foundation+legacy only")]
    BrandedRow { fdc_id: i64 },
}
