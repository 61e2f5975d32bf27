//! The read-only adapter trait the engine aligns against.

use crate::entry::{FoodEntry, FormTag, SourceTag};
use crate::error::NdbError;

/// Source-class filter for keyword search.
///
/// The engine's candidate pool is partitioned three ways: raw foundation
/// entries, cooked legacy entries, and branded products. `RawFoundation`
/// exists as a first-class filter because Stage 1b and the Stage 2 seed
/// search both want exactly that slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    Any,
    Foundation,
    Legacy,
    Branded,
    /// Foundation entries whose form tag is raw.
    RawFoundation,
}

impl SourceFilter {
    /// Whether `entry` falls inside this partition.
    pub fn admits(&self, entry: &FoodEntry) -> bool {
        match self {
            SourceFilter::Any => true,
            SourceFilter::Foundation => entry.source == SourceTag::Foundation,
            SourceFilter::Legacy => entry.source == SourceTag::Legacy,
            SourceFilter::Branded => entry.source == SourceTag::Branded,
            SourceFilter::RawFoundation => {
                entry.source == SourceTag::Foundation && entry.form == FormTag::Raw
            }
        }
    }
}

/// Narrow read interface to the nutrition database.
///
/// Implementations own tokenization and any internal ranking; the engine
/// treats `search` results as an unsorted pool and re-scores everything.
pub trait NdbAdapter: Send + Sync {
    /// Fetch one entry by identifier.
    fn lookup(&self, fdc_id: i64) -> Result<Option<FoodEntry>, NdbError>;

    /// Keyword search restricted to a source partition.
    fn search(&self, keyword: &str, filter: SourceFilter) -> Result<Vec<FoodEntry>, NdbError>;

    /// Stable hash of a canonical sample of the live store, recorded per run
    /// so telemetry can detect database drift between runs.
    fn content_fingerprint(&self) -> Result<String, NdbError>;
}

impl<A: NdbAdapter + ?Sized> NdbAdapter for std::sync::Arc<A> {
    fn lookup(&self, fdc_id: i64) -> Result<Option<FoodEntry>, NdbError> {
        (**self).lookup(fdc_id)
    }

    fn search(&self, keyword: &str, filter: SourceFilter) -> Result<Vec<FoodEntry>, NdbError> {
        (**self).search(keyword, filter)
    }

    fn content_fingerprint(&self) -> Result<String, NdbError> {
        (**self).content_fingerprint()
    }
}
