//! Bounded lookup memoization.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::adapter::{NdbAdapter, SourceFilter};
use crate::entry::FoodEntry;
use crate::error::NdbError;

/// Capacity of the identifier lookup cache.
pub const LOOKUP_CACHE_CAPACITY: usize = 512;

/// Decorates any adapter with an LRU cache over `lookup`.
///
/// Only successful hits are cached; misses and search results pass through.
/// The cache is owned by the adapter instance rather than living in module
/// state, so its lifecycle matches the engine instance it serves.
pub struct CachedNdb<A> {
    inner: A,
    cache: Mutex<LruCache<i64, FoodEntry>>,
}

impl<A: NdbAdapter> CachedNdb<A> {
    pub fn new(inner: A) -> Self {
        Self::with_capacity(inner, LOOKUP_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: A, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.len())
            .unwrap_or_default()
    }
}

impl<A: NdbAdapter> NdbAdapter for CachedNdb<A> {
    fn lookup(&self, fdc_id: i64) -> Result<Option<FoodEntry>, NdbError> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(entry) = cache.get(&fdc_id) {
                return Ok(Some(entry.clone()));
            }
        }
        let result = self.inner.lookup(fdc_id)?;
        if let Some(entry) = &result {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(fdc_id, entry.clone());
            }
        }
        Ok(result)
    }

    fn search(&self, keyword: &str, filter: SourceFilter) -> Result<Vec<FoodEntry>, NdbError> {
        self.inner.search(keyword, filter)
    }

    fn content_fingerprint(&self) -> Result<String, NdbError> {
        self.inner.content_fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{FormTag, Nutrients, SourceTag};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNdb {
        lookups: AtomicUsize,
    }

    impl NdbAdapter for CountingNdb {
        fn lookup(&self, fdc_id: i64) -> Result<Option<FoodEntry>, NdbError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if fdc_id == 1 {
                Ok(Some(FoodEntry {
                    fdc_id: 1,
                    name: "Grapes, raw".into(),
                    source: SourceTag::Foundation,
                    form: FormTag::Raw,
                    nutrients: Nutrients::default(),
                }))
            } else {
                Ok(None)
            }
        }

        fn search(&self, _: &str, _: SourceFilter) -> Result<Vec<FoodEntry>, NdbError> {
            Ok(Vec::new())
        }

        fn content_fingerprint(&self) -> Result<String, NdbError> {
            Ok("counting@0".into())
        }
    }

    #[test]
    fn repeated_lookup_hits_cache() {
        let cached = CachedNdb::new(CountingNdb {
            lookups: AtomicUsize::new(0),
        });
        assert!(cached.lookup(1).unwrap().is_some());
        assert!(cached.lookup(1).unwrap().is_some());
        assert!(cached.lookup(1).unwrap().is_some());
        assert_eq!(cached.inner.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_len(), 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let cached = CachedNdb::new(CountingNdb {
            lookups: AtomicUsize::new(0),
        });
        assert!(cached.lookup(42).unwrap().is_none());
        assert!(cached.lookup(42).unwrap().is_none());
        assert_eq!(cached.inner.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached_len(), 0);
    }

    #[test]
    fn eviction_is_pure_lru() {
        let cached = CachedNdb::with_capacity(
            CountingNdb {
                lookups: AtomicUsize::new(0),
            },
            1,
        );
        cached.lookup(1).unwrap();
        assert_eq!(cached.cached_len(), 1);
        // A second cached id would evict the first at capacity 1; a miss
        // leaves the cache untouched.
        cached.lookup(2).unwrap();
        assert_eq!(cached.cached_len(), 1);
    }
}
