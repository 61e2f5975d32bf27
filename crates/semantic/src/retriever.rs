//! Stage 1S retrieval: embed, rank, energy-filter, threshold.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::QueryEmbedder;
use crate::index::{IndexRow, SemanticIndex};

/// Outcome of one retrieval, whether or not a candidate survived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOutcome {
    /// Best surviving row and its cosine similarity, when one passed every
    /// filter.
    pub best: Option<(IndexRow, f64)>,
    /// Energy band applied, kcal/100 g, when a prior was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<(f64, f64)>,
    /// Tolerance fraction behind the band.
    pub tolerance: f64,
    /// Why nothing survived, when `best` is `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// Retriever bundling the loaded index with a query embedder.
pub struct SemanticRetriever {
    index: SemanticIndex,
    embedder: Box<dyn QueryEmbedder>,
}

impl SemanticRetriever {
    pub fn new(index: SemanticIndex, embedder: Box<dyn QueryEmbedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Retrieve the best candidate for `canonical_name`.
    ///
    /// `predicted_kcal` and `tolerance` define the energy band
    /// `[predicted * (1 - t), predicted * (1 + t)]`; with no prior, the band
    /// filter is skipped. `top_k` bounds the neighbor scan, `max_candidates`
    /// bounds how many band survivors are considered, and `min_similarity`
    /// is the acceptance floor.
    pub fn retrieve(
        &self,
        canonical_name: &str,
        predicted_kcal: Option<f64>,
        tolerance: f64,
        top_k: usize,
        min_similarity: f64,
        max_candidates: usize,
    ) -> RetrievalOutcome {
        let query = self.embedder.embed(canonical_name, self.index.dimension());
        let neighbors = self.index.nearest(&query, top_k);

        let band = predicted_kcal.map(|kcal| (kcal * (1.0 - tolerance), kcal * (1.0 + tolerance)));

        let mut survivors = Vec::new();
        for (row_idx, similarity) in &neighbors {
            let row = self.index.row(*row_idx);
            if let Some((lo, hi)) = band {
                if row.kcal_per_100g < lo || row.kcal_per_100g > hi {
                    continue;
                }
            }
            survivors.push((row.clone(), f64::from(*similarity)));
            if survivors.len() >= max_candidates {
                break;
            }
        }

        if survivors.is_empty() {
            let rejection = if neighbors.is_empty() {
                "empty_index"
            } else {
                "all_outside_energy_band"
            };
            return RetrievalOutcome {
                best: None,
                band,
                tolerance,
                rejection: Some(rejection.to_string()),
            };
        }

        // Neighbors arrive best-first, so the first survivor is the best.
        let (row, similarity) = survivors.remove(0);
        if similarity < min_similarity {
            debug!(
                query = canonical_name,
                similarity, min_similarity, "semantic candidate below similarity floor"
            );
            return RetrievalOutcome {
                best: None,
                band,
                tolerance,
                rejection: Some(format!(
                    "best_similarity_{similarity:.3}_below_{min_similarity:.3}"
                )),
            };
        }

        RetrievalOutcome {
            best: Some((row, similarity)),
            band,
            tolerance,
            rejection: None,
        }
    }
}
