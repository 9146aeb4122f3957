//! Visual Memory — a text-only description of a captured scene, sharing
//! the bank's storage and having its own embedding namespace, plus an
//! append-only access log so "has this been looked at recently" is
//! answerable without re-deriving it from recall hits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingStore;
use crate::error::Result;
use crate::ids::IdGenerator;
use crate::search::sanitize_fts5_query;
use crate::storage::Storage;

/// Candidate depth probed from the visual embedding namespace before
/// bank-filtering, mirroring the mental-model probe depth.
const PROBE_K: usize = 20;

/// Profile/project/session scope triple. Empty fields mean "unscoped"
/// (global within the bank).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualScope {
    pub profile: Option<String>,
    pub project: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualMemory {
    pub id: String,
    pub bank_id: String,
    pub source_id: Option<String>,
    pub description: String,
    pub scope: VisualScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a visual memory's access history: when it was looked at,
/// and through what query if recall surfaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualMemoryAccess {
    pub id: String,
    pub visual_memory_id: String,
    pub accessed_at: DateTime<Utc>,
    pub query: Option<String>,
}

/// A visual memory annotated with its match strength, returned by
/// `VisualMemoryService::search`.
#[derive(Debug, Clone)]
pub struct VisualMemoryHit {
    pub memory: VisualMemory,
    pub similarity: f64,
}

/// `Arc`-wrapped collaborators a caller threads through create/search/
/// record-access without repeating them at every call site, mirroring
/// `MentalModelService`.
pub struct VisualMemoryService {
    storage: Arc<Storage>,
    visual_index: Arc<EmbeddingStore>,
    ids: IdGenerator,
}

impl VisualMemoryService {
    pub fn new(storage: Arc<Storage>, visual_index: Arc<EmbeddingStore>) -> Self {
        Self { storage, visual_index, ids: IdGenerator::new() }
    }

    /// Persists a new visual memory and embeds its description.
    pub fn create(&self, memory: &VisualMemory) -> Result<()> {
        self.storage.create_visual_memory(memory)?;
        self.visual_index.upsert(&memory.id, &memory.description);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.visual_index.delete(id);
        self.storage.delete_visual_memory(id)
    }

    /// Semantic + fulltext search over one bank's visual memories,
    /// deduplicated and ranked by semantic similarity. Records an access
    /// row for every hit returned, since a search that surfaces a visual
    /// memory counts as an access to it.
    pub fn search(&self, bank_id: &str, query: &str, limit: usize) -> Result<Vec<VisualMemoryHit>> {
        let mut seen = std::collections::HashSet::new();
        let mut hits = Vec::new();

        for (id, distance) in self.visual_index.search(query, PROBE_K) {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(memory) = self.storage.get_visual_memory(&id)? else { continue };
            if memory.bank_id != bank_id {
                continue;
            }
            hits.push(VisualMemoryHit { similarity: 1.0 - distance as f64, memory });
        }

        let sanitized = sanitize_fts5_query(query);
        for id in self.storage.visual_memory_fulltext_search(bank_id, &sanitized, limit as u32)? {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(memory) = self.storage.get_visual_memory(&id)? else { continue };
            hits.push(VisualMemoryHit { similarity: 0.0, memory });
        }

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        let now = Utc::now();
        for hit in &hits {
            self.storage.record_visual_memory_access(&self.ids.next_string(), &hit.memory.id, now, Some(query))?;
        }
        Ok(hits)
    }

    /// Access history for one visual memory, most recent first.
    pub fn access_history(&self, visual_memory_id: &str) -> Result<Vec<VisualMemoryAccess>> {
        self.storage.list_visual_memory_accesses(visual_memory_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Storage, EmbeddingStore) {
        let storage = Storage::open_in_memory().unwrap();
        let index = EmbeddingStore::new(Arc::new(crate::embeddings::HashEmbedder::new()));
        (storage, index)
    }

    fn sample(bank_id: &str) -> VisualMemory {
        let now = Utc::now();
        VisualMemory {
            id: "v1".into(),
            bank_id: bank_id.into(),
            source_id: None,
            description: "a whiteboard covered in architecture diagrams".into(),
            scope: VisualScope::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unscoped_visual_memory_has_no_scope_fields() {
        let scope = VisualScope::default();
        assert!(scope.profile.is_none() && scope.project.is_none() && scope.session.is_none());
    }

    #[test]
    fn search_finds_created_memory_and_records_an_access() {
        let (storage, index) = setup();
        let service = VisualMemoryService::new(Arc::new(storage), Arc::new(index));
        let memory = sample("b1");
        service.create(&memory).unwrap();

        let hits = service.search("b1", "whiteboard covered in architecture diagrams", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, memory.id);

        let history = service.access_history(&memory.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query.as_deref(), Some("whiteboard covered in architecture diagrams"));
    }

    #[test]
    fn search_excludes_other_banks() {
        let (storage, index) = setup();
        let service = VisualMemoryService::new(Arc::new(storage), Arc::new(index));
        let mut memory = sample("other-bank");
        memory.id = "v2".into();
        service.create(&memory).unwrap();

        let hits = service.search("b1", "architecture diagrams", 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_removes_row_and_embedding() {
        let (storage, index) = setup();
        let storage = Arc::new(storage);
        let index = Arc::new(index);
        let service = VisualMemoryService::new(storage.clone(), index);
        let memory = sample("b1");
        service.create(&memory).unwrap();

        assert!(service.delete(&memory.id).unwrap());
        assert!(storage.get_visual_memory(&memory.id).unwrap().is_none());
    }
}
