//! Embedding store
//!
//! Namespaced wrapper around a vector index: `upsert`,
//! `search`, `delete`, keyed by the same id as the owning row. Four
//! namespaces share this type: memory, entity, mental-model, visual.

use std::sync::{Arc, Mutex};

use super::EmbeddingProvider;
use crate::search::VectorIndex;

pub struct EmbeddingStore {
    provider: Arc<dyn EmbeddingProvider>,
    index: Mutex<VectorIndex>,
}

impl EmbeddingStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimensions = provider.dimensions();
        Self {
            provider,
            index: Mutex::new(VectorIndex::new(dimensions)),
        }
    }

    /// Compute the embedding for `text`, delete any prior row for `id`, and
    /// insert `(id, vector)`.
    pub fn upsert(&self, id: &str, text: &str) {
        let vector = self.provider.embed(text);
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.delete(id);
        let _ = index.upsert(id, vector);
    }

    /// Embed `text` and return up to `k` `(id, cosine_distance)` pairs
    /// sorted ascending by distance.
    pub fn search(&self, text: &str, k: usize) -> Vec<(String, f32)> {
        let vector = self.provider.embed(text);
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.search(&vector, k)
    }

    /// Remove the vector for `id`. Silently returns on a missing id.
    pub fn delete(&self, id: &str) {
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.delete(id);
    }

    pub fn len(&self) -> usize {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    #[test]
    fn upsert_then_search_finds_self() {
        let store = EmbeddingStore::new(Arc::new(HashEmbedder::new()));
        store.upsert("m1", "Peter loves hiking");
        let results = store.search("Peter loves hiking", 5);
        assert_eq!(results[0].0, "m1");
    }

    #[test]
    fn delete_removes_from_index() {
        let store = EmbeddingStore::new(Arc::new(HashEmbedder::new()));
        store.upsert("m1", "some content");
        store.delete("m1");
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_twice_replaces_not_duplicates() {
        let store = EmbeddingStore::new(Arc::new(HashEmbedder::new()));
        store.upsert("m1", "first version");
        store.upsert("m1", "second version");
        assert_eq!(store.len(), 1);
    }
}
