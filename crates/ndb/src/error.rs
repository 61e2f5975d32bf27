//! Error types for the NDB adapter layer.

use thiserror::Error;

/// Errors produced by an NDB adapter.
#[derive(Debug, Error)]
pub enum NdbError {
    /// The backing store cannot be reached. Batch callers fail fast on this;
    /// interactive callers answer `available: false`.
    #[error("database_unavailable: {0}")]
    Unavailable(String),

    /// The snapshot file could not be read.
    #[error("ndb snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be parsed.
    #[error("ndb snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
