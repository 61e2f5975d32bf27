//! In-memory NDB backed by a JSON snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::adapter::{NdbAdapter, SourceFilter};
use crate::entry::FoodEntry;
use crate::error::NdbError;

/// Adapter over an entry set held in memory.
///
/// The snapshot format is a JSON array of [`FoodEntry`] values. Keyword
/// search is case-insensitive token containment: every whitespace-separated
/// token of the keyword must occur as a substring of the entry name.
#[derive(Debug, Default)]
pub struct MemoryNdb {
    entries: BTreeMap<i64, FoodEntry>,
    snapshot_label: String,
}

impl MemoryNdb {
    /// Empty store; entries are added with [`MemoryNdb::insert`].
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            snapshot_label: "inline".to_string(),
        }
    }

    /// Load a JSON snapshot file (an array of entries).
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> Result<Self, NdbError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let entries: Vec<FoodEntry> = serde_json::from_slice(&bytes)?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        debug!(entries = entries.len(), snapshot = %label, "ndb snapshot loaded");
        let mut store = Self {
            entries: BTreeMap::new(),
            snapshot_label: label,
        };
        for entry in entries {
            store.insert(entry);
        }
        Ok(store)
    }

    /// Insert or replace one entry.
    pub fn insert(&mut self, entry: FoodEntry) {
        self.entries.insert(entry.fdc_id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = &FoodEntry> {
        self.entries.values()
    }
}

impl NdbAdapter for MemoryNdb {
    fn lookup(&self, fdc_id: i64) -> Result<Option<FoodEntry>, NdbError> {
        Ok(self.entries.get(&fdc_id).cloned())
    }

    fn search(&self, keyword: &str, filter: SourceFilter) -> Result<Vec<FoodEntry>, NdbError> {
        let needle = keyword.to_lowercase();
        let tokens: Vec<&str> = needle.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .values()
            .filter(|entry| filter.admits(entry))
            .filter(|entry| {
                let name = entry.name_lower();
                tokens.iter().all(|token| name.contains(token))
            })
            .cloned()
            .collect())
    }

    fn content_fingerprint(&self) -> Result<String, NdbError> {
        // Canonical sample: identifier + name + energy of every entry in
        // identifier order. Entry order is fixed by the BTreeMap, so the
        // digest is stable for a given content set.
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            hasher.update(entry.fdc_id.to_be_bytes());
            hasher.update(entry.name.as_bytes());
            hasher.update(entry.nutrients.energy_kcal.to_be_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Ok(format!("{}@{}", self.snapshot_label, &digest[..12]))
    }
}
