//! Read-only adapter over the reference nutrition database.
//!
//! The alignment engine never talks to a database directly; it goes through
//! the narrow [`NdbAdapter`] trait: identifier lookup, keyword search
//! partitioned by source class, and a content fingerprint recorded per run.
//! [`MemoryNdb`] implements the trait over a JSON snapshot (or programmatic
//! inserts) and [`CachedNdb`] layers the bounded LRU lookup cache on top of
//! any adapter.
//!
//! Search results are an unsorted pool by contract; ranking is entirely the
//! engine's concern, so two adapters returning the same set are
//! interchangeable.

mod adapter;
mod cache;
mod entry;
mod error;
mod memory;

pub use adapter::{NdbAdapter, SourceFilter};
pub use cache::{CachedNdb, LOOKUP_CACHE_CAPACITY};
pub use entry::{FoodEntry, FormTag, Nutrients, SourceTag, ATWATER_TOLERANCE};
pub use error::NdbError;
pub use memory::MemoryNdb;
