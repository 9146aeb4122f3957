//! Vector index
//!
//! A brute-force linear scan over a key/vector mapping, appropriate at
//! the scale a single bank's memory store reaches without requiring a
//! native HNSW library.

use std::collections::HashMap;

use crate::embeddings::cosine_distance;

/// Vector search error types.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "invalid dimensions: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

/// A namespaced, in-process vector index: `upsert`, `search`, `delete`.
#[derive(Debug, Default)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert or replace the vector for `id`.
    pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                vector.len(),
            ));
        }
        self.vectors.insert(id.to_string(), vector);
        Ok(())
    }

    /// Remove the vector for `id`. Silently returns if `id` is absent.
    pub fn delete(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    /// Up to `k` nearest neighbours of `query`, ascending by cosine
    /// distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine_distance(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_search_finds_closest() {
        let mut index = VectorIndex::new(3);
        index.upsert("a", vec![1.0, 0.0, 0.0]).unwrap();
        index.upsert("b", vec![0.0, 1.0, 0.0]).unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 1);
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn delete_missing_id_is_noop() {
        let mut index = VectorIndex::new(3);
        index.delete("missing");
        assert!(index.is_empty());
    }

    #[test]
    fn upsert_replaces_existing() {
        let mut index = VectorIndex::new(2);
        index.upsert("a", vec![1.0, 0.0]).unwrap();
        index.upsert("a", vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);
        let results = index.search(&[0.0, 1.0], 1);
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = VectorIndex::new(3);
        assert!(index.upsert("a", vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn search_results_sorted_ascending_by_distance() {
        let mut index = VectorIndex::new(2);
        index.upsert("near", vec![1.0, 0.0]).unwrap();
        index.upsert("far", vec![-1.0, 0.0]).unwrap();
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].0, "near");
        assert_eq!(results[1].0, "far");
    }
}
