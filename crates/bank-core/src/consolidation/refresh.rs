//! Mental-model refresh fan-out
//!
//! Runs after a consolidation batch: selects which auto-refresh mental
//! models are eligible given the tag set of what was just consolidated
//!, then re-derives each model's
//! content through the `reflect` collaborator — agent
//! orchestration is out of scope, so `reflect` is a contract-only trait
//! here, mirroring how `FactExtractor` stands in for the extraction LLM.

use std::sync::Arc;

use chrono::Utc;

use crate::embeddings::EmbeddingStore;
use crate::error::Result;
use crate::mental_model::MentalModel;
use crate::storage::Storage;

use super::phases::ConsolidationReport;

/// Runs one `reflect` query and returns its answer text. Implementations
/// live outside this crate (agent orchestration is an external
/// collaborator); `save_observations=false` and no mental-model lookup
/// must be honored by the implementation to avoid recursive refresh.
pub trait ReflectCollaborator: Send + Sync {
    fn reflect(&self, bank_id: &str, query: &str, save_observations: bool) -> Result<String>;
}

/// Deterministic test double: "answers" by echoing the query back. Never
/// exercises a real LLM; a lightweight default for every injected
/// collaborator.
#[derive(Debug, Clone, Default)]
pub struct EchoReflectCollaborator;

impl ReflectCollaborator for EchoReflectCollaborator {
    fn reflect(&self, _bank_id: &str, query: &str, _save_observations: bool) -> Result<String> {
        Ok(query.to_string())
    }
}

/// Which auto-refresh models are eligible after a batch, honoring the
/// tag isolation invariant: a batch containing tagged memories never
/// implicitly refreshes a differently-tagged model, and a batch of only
/// untagged memories never refreshes a tagged model.
pub fn select_models_to_refresh<'a>(models: &'a [MentalModel], report: &ConsolidationReport) -> Vec<&'a MentalModel> {
    if report.processed == 0 {
        return vec![];
    }
    if !report.consolidated_tags.is_empty() {
        models
            .iter()
            .filter(|m| m.auto_refresh && (m.tags.is_empty() || m.tags.iter().any(|t| report.consolidated_tags.contains(t))))
            .collect()
    } else if report.consolidated_any_untagged {
        models.iter().filter(|m| m.auto_refresh && m.tags.is_empty()).collect()
    } else {
        vec![]
    }
}

/// Re-derive one model's content by reflecting on its `source_query`,
/// then persist the new content and re-embed it.
pub fn refresh_one(storage: &Storage, embedding_store: &EmbeddingStore, reflect: &dyn ReflectCollaborator, model: &MentalModel) -> Result<()> {
    let content = reflect.reflect(&model.bank_id, &model.source_query, false)?;
    let now = Utc::now();
    storage.refresh_mental_model(&model.id, &content, &model.source_memory_ids, now)?;
    embedding_store.upsert(&model.id, &content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn model(tags: Vec<&str>) -> MentalModel {
        let now = Utc::now();
        MentalModel {
            id: ulid::Ulid::new().to_string(),
            bank_id: "b1".into(),
            name: "m".into(),
            source_query: "what does Peter like?".into(),
            content: None,
            source_memory_ids: vec![],
            tags: tags.into_iter().map(String::from).collect(),
            auto_refresh: true,
            last_refreshed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tagged_batch_refreshes_overlapping_and_global_models() {
        let overlapping = model(vec!["work"]);
        let global = model(vec![]);
        let disjoint = model(vec!["personal"]);
        let models = vec![overlapping.clone(), global.clone(), disjoint.clone()];
        let mut report = ConsolidationReport::default();
        report.processed = 1;
        report.consolidated_tags.insert("work".to_string());

        let selected = select_models_to_refresh(&models, &report);
        let ids: Vec<&str> = selected.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&overlapping.id.as_str()));
        assert!(ids.contains(&global.id.as_str()));
        assert!(!ids.contains(&disjoint.id.as_str()));
    }

    #[test]
    fn untagged_batch_refreshes_only_untagged_models() {
        let tagged = model(vec!["work"]);
        let untagged = model(vec![]);
        let models = vec![tagged.clone(), untagged.clone()];
        let mut report = ConsolidationReport::default();
        report.processed = 1;
        report.consolidated_any_untagged = true;

        let selected = select_models_to_refresh(&models, &report);
        let ids: Vec<&str> = selected.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&untagged.id.as_str()));
        assert!(!ids.contains(&tagged.id.as_str()));
    }

    #[test]
    fn empty_report_refreshes_nothing() {
        let models = vec![model(vec![])];
        let report = ConsolidationReport::default();
        assert!(select_models_to_refresh(&models, &report).is_empty());
    }
}
