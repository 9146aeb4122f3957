//! Mental Model — a named, regenerable summary over a bank's memories.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingStore;
use crate::error::Result;
use crate::storage::Storage;

/// A model is stale once more than this many days have elapsed since its
/// last refresh.
pub const STALENESS_WINDOW_DAYS: i64 = 7;

/// Similarity threshold above which a new mental-model request is
/// considered a match for an existing model.
pub const MATCH_THRESHOLD: f64 = 0.85;

/// Similarity threshold below which `search_with_staleness` still returns
/// a result but annotates it as weak.
pub const WEAK_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentalModel {
    pub id: String,
    pub bank_id: String,
    pub name: String,
    pub source_query: String,
    pub content: Option<String>,
    pub source_memory_ids: Vec<String>,
    pub tags: Vec<String>,
    pub auto_refresh: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MentalModel {
    /// `true` once more than [`STALENESS_WINDOW_DAYS`] have elapsed since
    /// `last_refreshed_at`, or it has never been refreshed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_refreshed_at {
            None => true,
            Some(refreshed) => now - refreshed > Duration::days(STALENESS_WINDOW_DAYS),
        }
    }
}

/// A mental model annotated with its match strength against a query,
/// returned by `search_with_staleness`.
#[derive(Debug, Clone)]
pub struct MentalModelMatch {
    pub model: MentalModel,
    pub similarity: f64,
    pub is_weak: bool,
    pub is_stale: bool,
}

/// Candidate depth probed from the mental-model embedding namespace before
/// bank-filtering and thresholding.
const PROBE_K: usize = 20;

/// Models in `bank_id` whose stored embedding similarity to `query` is at
/// or above `threshold`, best match first.
pub fn find_matching_models(
    storage: &Storage,
    model_index: &EmbeddingStore,
    bank_id: &str,
    query: &str,
    threshold: f64,
) -> Result<Vec<MentalModel>> {
    let mut out = Vec::new();
    for (id, distance) in model_index.search(query, PROBE_K) {
        let similarity = 1.0 - distance as f64;
        if similarity < threshold {
            continue;
        }
        let Some(model) = storage.get_mental_model(&id)? else {
            continue;
        };
        if model.bank_id != bank_id {
            continue;
        }
        out.push(model);
    }
    Ok(out)
}

/// Models in `bank_id` matching `query` at or above [`WEAK_MATCH_THRESHOLD`],
/// each annotated with its similarity, whether it is a weak match (below
/// [`MATCH_THRESHOLD`]), and whether it is stale, truncated to `limit`.
pub fn search_with_staleness(
    storage: &Storage,
    model_index: &EmbeddingStore,
    bank_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<MentalModelMatch>> {
    let now = Utc::now();
    let mut out = Vec::new();
    for (id, distance) in model_index.search(query, PROBE_K) {
        let similarity = 1.0 - distance as f64;
        if similarity < WEAK_MATCH_THRESHOLD {
            continue;
        }
        let Some(model) = storage.get_mental_model(&id)? else {
            continue;
        };
        if model.bank_id != bank_id {
            continue;
        }
        out.push(MentalModelMatch {
            is_stale: model.is_stale(now),
            is_weak: similarity < MATCH_THRESHOLD,
            similarity,
            model,
        });
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

/// Persist a new mental model and embed its `source_query`.
pub fn create_model(storage: &Storage, model_index: &EmbeddingStore, model: &MentalModel) -> Result<()> {
    storage.create_mental_model(model)?;
    model_index.upsert(&model.id, &model.source_query);
    Ok(())
}

/// `Arc`-wrapped collaborators a caller threads through `create_model`/
/// `find_matching_models`/`search_with_staleness` without repeating them at
/// every call site.
pub struct MentalModelService {
    pub storage: Arc<Storage>,
    pub model_index: Arc<EmbeddingStore>,
}

impl MentalModelService {
    pub fn new(storage: Arc<Storage>, model_index: Arc<EmbeddingStore>) -> Self {
        Self { storage, model_index }
    }

    pub fn create(&self, model: &MentalModel) -> Result<()> {
        create_model(&self.storage, &self.model_index, model)
    }

    pub fn find_matching(&self, bank_id: &str, query: &str, threshold: f64) -> Result<Vec<MentalModel>> {
        find_matching_models(&self.storage, &self.model_index, bank_id, query, threshold)
    }

    pub fn search_with_staleness(&self, bank_id: &str, query: &str, limit: usize) -> Result<Vec<MentalModelMatch>> {
        search_with_staleness(&self.storage, &self.model_index, bank_id, query, limit)
    }
}
