//! The converging error type for the alignment layer.
//!
//! Most failure kinds inside the cascade (guard rejections, unsupported
//! conversions, aborted decompositions) are recoverable and stay inside the
//! cascade as recorded rejection reasons. `AlignError` only carries what
//! cannot be recovered per food: a malformed query, an unreachable database,
//! or a configuration problem detected at construction.

use thiserror::Error;

use configs::ConfigError;
use ndb::NdbError;
use normalize::NormalizeError;

/// Unrecoverable alignment failures.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("normalization failure: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("database failure: {0}")]
    Ndb(#[from] NdbError),

    #[error("configuration failure: {0}")]
    Config(#[from] ConfigError),
}

impl AlignError {
    /// Whether this is the database-unavailable kind, which batch callers
    /// fail fast on and interactive callers soften to `available: false`.
    pub fn is_database_unavailable(&self) -> bool {
        matches!(self, AlignError::Ndb(NdbError::Unavailable(_)))
    }
}
