//! The on-disk index artifact and its loader.
//!
//! Three sibling files make up an index:
//!
//! - `vectors.bin`: row-major little-endian f32 values, one row per entry
//! - `metadata.json`: per-row identifier, name, source, energy density
//! - `manifest.json`: model id, dimension, entry count, build timestamp,
//!   and the SHA-256 of the other two files
//!
//! The loader recomputes both digests and refuses the index on any
//! mismatch. It also rejects branded rows: the index contract is
//! foundation + legacy entries only.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embed::cosine;
use crate::error::SemanticError;

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Manifest describing one index build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// Identifier of the embedding model that produced the vectors.
    pub model: String,
    pub dimension: usize,
    pub entries: usize,
    /// ISO-8601 UTC build timestamp.
    pub built_at: String,
    pub vectors_sha256: String,
    pub metadata_sha256: String,
}

/// Per-row metadata carried alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRow {
    pub fdc_id: i64,
    pub name: String,
    /// Source partition label; must be `foundation` or `legacy`.
    pub source: String,
    pub kcal_per_100g: f64,
}

/// A loaded, checksum-verified index.
#[derive(Debug)]
pub struct SemanticIndex {
    manifest: IndexManifest,
    rows: Vec<IndexRow>,
    vectors: Vec<f32>,
}

impl SemanticIndex {
    /// Load and verify the index under `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, SemanticError> {
        let dir = dir.as_ref();
        let manifest_bytes = read_artifact(dir, MANIFEST_FILE)?;
        let manifest: IndexManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|source| SemanticError::Parse {
                artifact: MANIFEST_FILE.to_string(),
                source,
            })?;

        let vector_bytes = read_artifact(dir, VECTORS_FILE)?;
        verify_checksum(VECTORS_FILE, &manifest.vectors_sha256, &vector_bytes)?;
        let metadata_bytes = read_artifact(dir, METADATA_FILE)?;
        verify_checksum(METADATA_FILE, &manifest.metadata_sha256, &metadata_bytes)?;

        let rows: Vec<IndexRow> =
            serde_json::from_slice(&metadata_bytes).map_err(|source| SemanticError::Parse {
                artifact: METADATA_FILE.to_string(),
                source,
            })?;
        for row in &rows {
            if row.source != "foundation" && row.source != "legacy" {
                return Err(SemanticError::BrandedRow { fdc_id: row.fdc_id });
            }
        }

        let expected = manifest.entries * manifest.dimension;
        let found = vector_bytes.len() / std::mem::size_of::<f32>();
        if found != expected || rows.len() != manifest.entries {
            return Err(SemanticError::Geometry { expected, found });
        }

        let vectors = vector_bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        debug!(
            entries = manifest.entries,
            dimension = manifest.dimension,
            model = %manifest.model,
            "semantic index loaded"
        );

        Ok(Self {
            manifest,
            rows,
            vectors,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &IndexRow {
        &self.rows[index]
    }

    fn vector(&self, index: usize) -> &[f32] {
        let dim = self.manifest.dimension;
        &self.vectors[index * dim..(index + 1) * dim]
    }

    /// Cosine top-K neighbors of `query`, best first. Ties break on row
    /// order, which the build fixes, so results are deterministic.
    pub fn nearest(&self, query: &[f32], top_k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = (0..self.rows.len())
            .map(|idx| (idx, cosine(query, self.vector(idx))))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        scored
    }
}

/// Write an index artifact set. This is the dual of [`SemanticIndex::load`],
/// exposed for the offline build tool and for tests; the alignment engine
/// never writes an index.
pub fn write_index(
    dir: impl AsRef<Path>,
    model: &str,
    built_at: &str,
    dimension: usize,
    rows: &[IndexRow],
    vectors: &[f32],
) -> Result<IndexManifest, SemanticError> {
    let dir = dir.as_ref();
    assert_eq!(
        vectors.len(),
        rows.len() * dimension,
        "vector buffer does not match rows * dimension"
    );

    let mut vector_bytes = Vec::with_capacity(vectors.len() * 4);
    for value in vectors {
        vector_bytes.extend_from_slice(&value.to_le_bytes());
    }
    let metadata_bytes = serde_json::to_vec_pretty(rows).map_err(|source| SemanticError::Parse {
        artifact: METADATA_FILE.to_string(),
        source,
    })?;

    let manifest = IndexManifest {
        model: model.to_string(),
        dimension,
        entries: rows.len(),
        built_at: built_at.to_string(),
        vectors_sha256: sha256_hex(&vector_bytes),
        metadata_sha256: sha256_hex(&metadata_bytes),
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).map_err(|source| SemanticError::Parse {
            artifact: MANIFEST_FILE.to_string(),
            source,
        })?;

    write_artifact(dir, VECTORS_FILE, &vector_bytes)?;
    write_artifact(dir, METADATA_FILE, &metadata_bytes)?;
    write_artifact(dir, MANIFEST_FILE, &manifest_bytes)?;
    Ok(manifest)
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>, SemanticError> {
    fs::read(dir.join(name)).map_err(|source| SemanticError::Io {
        artifact: name.to_string(),
        source,
    })
}

fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), SemanticError> {
    fs::write(dir.join(name), bytes).map_err(|source| SemanticError::Io {
        artifact: name.to_string(),
        source,
    })
}

fn verify_checksum(artifact: &str, stored: &str, bytes: &[u8]) -> Result<(), SemanticError> {
    let computed = sha256_hex(bytes);
    if computed != stored {
        return Err(SemanticError::ChecksumMismatch {
            artifact: artifact.to_string(),
            stored: stored.to_string(),
            computed,
        });
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{HashEmbedder, QueryEmbedder};

    fn build_index(dir: &Path) -> IndexManifest {
        let embedder = HashEmbedder::new();
        let dimension = 64;
        let names = [
            (1001, "grapes raw", 67.0),
            (1002, "olives ripe canned", 115.0),
            (1003, "brussels sprouts raw", 43.0),
        ];
        let rows: Vec<IndexRow> = names
            .iter()
            .map(|(fdc_id, name, kcal)| IndexRow {
                fdc_id: *fdc_id,
                name: (*name).to_string(),
                source: "foundation".to_string(),
                kcal_per_100g: *kcal,
            })
            .collect();
        let mut vectors = Vec::new();
        for (_, name, _) in names {
            vectors.extend(embedder.embed(name, dimension));
        }
        write_index(
            dir,
            embedder.model_id(),
            "2025-06-01T00:00:00Z",
            dimension,
            &rows,
            &vectors,
        )
        .unwrap()
    }

    #[test]
    fn roundtrip_loads_and_searches() {
        let dir = tempfile::tempdir().unwrap();
        build_index(dir.path());

        let index = SemanticIndex::load(dir.path()).unwrap();
        assert_eq!(index.len(), 3);

        let query = HashEmbedder::new().embed("grapes raw", index.dimension());
        let hits = index.nearest(&query, 2);
        assert_eq!(index.row(hits[0].0).fdc_id, 1001);
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn tampered_vectors_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        build_index(dir.path());

        let vectors_path = dir.path().join(VECTORS_FILE);
        let mut bytes = fs::read(&vectors_path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&vectors_path, &bytes).unwrap();

        let err = SemanticIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SemanticError::ChecksumMismatch { .. }));
    }

    #[test]
    fn tampered_metadata_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        build_index(dir.path());

        let metadata_path = dir.path().join(METADATA_FILE);
        let text = fs::read_to_string(&metadata_path).unwrap();
        fs::write(&metadata_path, text.replace("grapes", "mangos")).unwrap();

        let err = SemanticIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SemanticError::ChecksumMismatch { .. }));
    }

    #[test]
    fn branded_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashEmbedder::new();
        let rows = vec![IndexRow {
            fdc_id: 9,
            name: "brand x soda".to_string(),
            source: "branded".to_string(),
            kcal_per_100g: 40.0,
        }];
        let vectors = embedder.embed("brand x soda", 16);
        write_index(dir.path(), "m", "2025-06-01T00:00:00Z", 16, &rows, &vectors).unwrap();

        let err = SemanticIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SemanticError::BrandedRow { fdc_id: 9 }));
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SemanticIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, SemanticError::Io { .. }));
    }
}
