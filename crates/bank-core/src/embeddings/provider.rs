//! Embedding generation
//!
//! `EmbeddingProvider` is a small trait boundary so the store never
//! depends directly on a specific model. Production callers can enable
//! the `fastembed-backend` feature for local ONNX inference; the default,
//! and the path every test exercises, is a deterministic hash-based
//! embedder.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Embedding dimensionality shared by every namespace (fixed at store
/// creation; resizing requires a rebuild).
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Anything that can turn text into a fixed-width vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Deterministic hash-based embedder.
///
/// Not semantically meaningful, but stable and reproducible: the same text
/// always yields the same vector, which is exactly what deterministic
/// tests need. Implemented by hashing overlapping word shingles into
/// buckets of a fixed-width vector
/// and normalizing, which gives nearly-identical text nearly-identical
/// vectors (so duplicate-detection round-trips still exercise a believable
/// cosine-similarity signal).
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: EMBEDDING_DIMENSIONS,
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            return vector;
        }
        for window in 1..=2 {
            for shingle in tokens.windows(window) {
                let joined = shingle.join(" ");
                let h = Self::hash_token(&joined);
                let idx = (h as usize) % self.dimensions;
                let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
                vector[idx] += sign;
            }
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` if
/// dimensions mismatch rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cosine distance (`1 - similarity`), the unit search results are ranked
/// by ascending on.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(feature = "fastembed-backend")]
pub mod fastembed_backend {
    //! Local ONNX inference via fastembed, gated behind the
    //! `fastembed-backend` feature and never exercised by default tests
    //! (model download requires network access the test suite doesn't
    //! assume).
    use super::EmbeddingProvider;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl FastEmbedProvider {
        pub fn try_new() -> Result<Self, String> {
            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(false);
            let model = TextEmbedding::try_new(options).map_err(|e| e.to_string())?;
            Ok(Self {
                model: Mutex::new(model),
                dimensions: super::EMBEDDING_DIMENSIONS,
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn embed(&self, text: &str) -> Vec<f32> {
            let mut model = self.model.lock().expect("fastembed model lock poisoned");
            model
                .embed(vec![text], None)
                .ok()
                .and_then(|mut v| v.pop())
                .map(|v| v.into_iter().take(self.dimensions).collect())
                .unwrap_or_else(|| vec![0.0; self.dimensions])
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_vector() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Peter loves hiking");
        let b = embedder.embed("Peter loves hiking");
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_different_vector() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Peter loves hiking");
        let b = embedder.embed("Bob uses Vim");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("the quick brown fox");
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_distance_mismatched_dims_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }
}
