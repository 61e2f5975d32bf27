//! Query embedding.
//!
//! Retrieval quality comes from the offline index build; at query time the
//! engine only needs a deterministic embedding in the same space. The
//! default [`HashEmbedder`] hashes tokens into buckets and L2-normalizes,
//! which is fully reproducible with no model assets, the property the
//! determinism guarantees of the engine rely on.

use fxhash::hash64;

/// Embeds a query string into the index's vector space.
pub trait QueryEmbedder: Send + Sync {
    /// Produce a `dimension`-length vector for `text`.
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32>;

    /// Identifier recorded in telemetry and matched against the manifest.
    fn model_id(&self) -> &str;
}

/// Deterministic feature-hashing embedder.
///
/// Each whitespace token is hashed to a bucket with a signed contribution;
/// token bigrams are folded in as well so word order carries some signal.
/// The result is L2-normalized, so cosine similarity reduces to a dot
/// product.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn fold(vector: &mut [f32], text: &str) {
        let h = hash64(text.as_bytes());
        let dim = vector.len() as u64;
        let bucket = (h % dim) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl QueryEmbedder for HashEmbedder {
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0f32; dimension.max(1)];
        let tokens: Vec<&str> = text.split_whitespace().collect();
        for token in &tokens {
            Self::fold(&mut vector, token);
        }
        for pair in tokens.windows(2) {
            Self::fold(&mut vector, &format!("{} {}", pair[0], pair[1]));
        }
        l2_normalize_in_place(&mut vector);
        vector
    }

    fn model_id(&self) -> &str {
        "feature-hash-v1"
    }
}

/// Normalize a vector to unit length in place; zero vectors are left as-is.
pub(crate) fn l2_normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity of two equal-length vectors.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::new();
        assert_eq!(
            embedder.embed("grapes raw", 64),
            embedder.embed("grapes raw", 64)
        );
    }

    #[test]
    fn embedding_is_unit_length() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("brussels sprouts roasted", 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn identical_text_is_most_similar_to_itself() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("grapes raw", 128);
        let b = embedder.embed("grapes raw", 128);
        let c = embedder.embed("beef steak grilled", 128);
        assert!(cosine(&a, &b) > cosine(&a, &c));
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_cosine_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
