//! Consolidation reconciliation: find related observations for a source
//! memory, call the action-proposing collaborator once, then execute the
//! returned actions in order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::embeddings::EmbeddingStore;
use crate::error::{BankError, Result};
use crate::ids::IdGenerator;
use crate::memory::{FactType, HistoryEntry, MemoryUnit, TagsMatch};
use crate::storage::Storage;

/// Minimum semantic similarity for an existing observation to be offered
/// as a candidate.
const RELATED_SIMILARITY_THRESHOLD: f64 = 0.5;
/// Candidate over-fetch depth before the similarity/tag filter.
const CANDIDATE_PROBE_K: usize = 20;
/// Default batch size when the caller doesn't specify one.
pub const DEFAULT_BATCH_SIZE: u32 = 50;

/// One existing observation offered to the action-proposing collaborator.
#[derive(Debug, Clone)]
pub struct CandidateObservation {
    pub id: String,
    pub content: String,
    pub proof_count: u32,
    pub source_count: usize,
}

/// An action returned by the collaborator for one source memory. Synonym
/// normalization (e.g. `learning_id` -> `observationId`) is the
/// collaborator's responsibility before this type is constructed.
#[derive(Debug, Clone)]
pub enum ConsolidationAction {
    Create { text: String, reason: String },
    Update { observation_id: String, text: String, reason: String },
    Merge { observation_ids: Vec<String>, text: String, reason: String },
    Skip { reason: String },
}

/// Anything that turns a source memory and its candidate observations
/// into a list of actions. Trait-injected for the same reason
/// `FactExtractor` is: the reconciliation loop never depends on a
/// concrete LLM client.
pub trait ConsolidationActionProvider: Send + Sync {
    fn propose(&self, source: &MemoryUnit, candidates: &[CandidateObservation]) -> Result<Vec<ConsolidationAction>>;
}

/// Deterministic, LLM-free provider: creates a new observation when no
/// candidate is offered, otherwise updates the first candidate with the
/// source's content. Exists so the consolidation engine and its tests
/// never require a live LLM.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedActionProvider;

impl ConsolidationActionProvider for RuleBasedActionProvider {
    fn propose(&self, source: &MemoryUnit, candidates: &[CandidateObservation]) -> Result<Vec<ConsolidationAction>> {
        if let Some(first) = candidates.first() {
            Ok(vec![ConsolidationAction::Update {
                observation_id: first.id.clone(),
                text: source.content.clone(),
                reason: "corroborated by a new source".to_string(),
            }])
        } else {
            Ok(vec![ConsolidationAction::Create {
                text: source.content.clone(),
                reason: "no existing observation covers this source".to_string(),
            }])
        }
    }
}

/// Outcome of one `run_batch` call, used both for observability and to
/// drive the mental-model refresh fan-out.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub consolidated_tags: HashSet<String>,
    pub consolidated_any_untagged: bool,
}

pub struct ConsolidationEngine {
    storage: Arc<Storage>,
    memory_index: Arc<EmbeddingStore>,
    provider: Arc<dyn ConsolidationActionProvider>,
    ids: IdGenerator,
}

impl ConsolidationEngine {
    pub fn new(storage: Arc<Storage>, memory_index: Arc<EmbeddingStore>, provider: Arc<dyn ConsolidationActionProvider>) -> Self {
        Self {
            storage,
            memory_index,
            provider,
            ids: IdGenerator::new(),
        }
    }

    /// Process up to `batch_size` unconsolidated memories for `bank_id`,
    /// oldest first.
    pub fn run_batch(&self, bank_id: &str, batch_size: Option<u32>) -> Result<ConsolidationReport> {
        let sources = self
            .storage
            .list_unconsolidated_memory_units(bank_id, batch_size.unwrap_or(DEFAULT_BATCH_SIZE))?;

        let mut report = ConsolidationReport::default();
        for source in sources {
            self.process_one(bank_id, &source, &mut report);
        }
        Ok(report)
    }

    fn process_one(&self, bank_id: &str, source: &MemoryUnit, report: &mut ConsolidationReport) {
        let candidates = match self.find_related_observations(bank_id, source) {
            Ok(c) => c,
            Err(_) => {
                report.failed += 1;
                return;
            }
        };

        let actions = match self.provider.propose(source, &candidates) {
            Ok(actions) => actions,
            Err(_) => {
                report.failed += 1;
                return;
            }
        };

        let mut any_succeeded = false;
        for action in &actions {
            match self.execute_action(source, action) {
                Ok(()) => {
                    any_succeeded = true;
                    match action {
                        ConsolidationAction::Create { .. } => report.created += 1,
                        ConsolidationAction::Update { .. } => report.updated += 1,
                        ConsolidationAction::Merge { .. } => report.merged += 1,
                        ConsolidationAction::Skip { .. } => report.skipped += 1,
                    }
                }
                Err(_) => report.failed += 1,
            }
        }

        if any_succeeded {
            if self.storage.mark_consolidated(&source.id, Utc::now()).is_ok() {
                report.processed += 1;
                if source.tags.is_empty() {
                    report.consolidated_any_untagged = true;
                } else {
                    report.consolidated_tags.extend(source.tags.iter().cloned());
                }
            }
        }
    }

    /// Semantic KNN against the memory vector index, filtered to
    /// same-bank observations at or above [`RELATED_SIMILARITY_THRESHOLD`].
    /// When `source` carries tags, an `all_strict` tag match prevents a
    /// differently-scoped observation from leaking into the candidate set.
    fn find_related_observations(&self, bank_id: &str, source: &MemoryUnit) -> Result<Vec<CandidateObservation>> {
        let hits = self.memory_index.search(&source.content, CANDIDATE_PROBE_K);
        let mut candidates = Vec::new();
        for (id, distance) in hits {
            let similarity = 1.0 - distance as f64;
            if similarity < RELATED_SIMILARITY_THRESHOLD {
                continue;
            }
            let Some(unit) = self.storage.get_memory_unit(&id)? else {
                continue;
            };
            if unit.bank_id != bank_id || unit.fact_type != FactType::Observation {
                continue;
            }
            if !source.tags.is_empty() && !TagsMatch::AllStrict.matches(&source.tags, &unit.tags) {
                continue;
            }
            candidates.push(CandidateObservation {
                id: unit.id,
                content: unit.content,
                proof_count: unit.proof_count,
                source_count: unit.source_memory_ids.len(),
            });
        }
        Ok(candidates)
    }

    fn execute_action(&self, source: &MemoryUnit, action: &ConsolidationAction) -> Result<()> {
        match action {
            ConsolidationAction::Create { text, .. } => self.execute_create(source, text),
            ConsolidationAction::Update { observation_id, text, reason } => self.execute_update(source, observation_id, text, reason),
            ConsolidationAction::Merge { observation_ids, text, reason } => self.execute_merge(source, observation_ids, text, reason),
            ConsolidationAction::Skip { .. } => Ok(()),
        }
    }

    fn execute_create(&self, source: &MemoryUnit, text: &str) -> Result<()> {
        let now = Utc::now();
        let observation = MemoryUnit {
            id: self.ids.next_string(),
            bank_id: source.bank_id.clone(),
            content: text.to_string(),
            fact_type: FactType::Observation,
            confidence: source.confidence,
            valid_from: source.valid_from,
            valid_to: source.valid_to,
            mentioned_at: source.mentioned_at,
            occurred_start: source.occurred_start,
            occurred_end: source.occurred_end,
            event_date: source.event_date,
            document_id: None,
            chunk_id: None,
            source_text: None,
            tags: source.tags.clone(),
            proof_count: 1,
            source_memory_ids: vec![source.id.clone()],
            history: vec![],
            consolidated_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_memory_unit(&observation)?;
        self.memory_index.upsert(&observation.id, &observation.content);
        Ok(())
    }

    fn execute_update(&self, source: &MemoryUnit, observation_id: &str, text: &str, reason: &str) -> Result<()> {
        let mut target = self
            .storage
            .get_memory_unit(observation_id)?
            .filter(|m| m.bank_id == source.bank_id && m.fact_type == FactType::Observation)
            .ok_or_else(|| BankError::NotFound(format!("observation {observation_id} not found in bank")))?;

        let now = Utc::now();
        target.history.push(HistoryEntry {
            previous_text: target.content.clone(),
            changed_at: now,
            reason: reason.to_string(),
            source_memory_id: source.id.clone(),
        });
        if !target.source_memory_ids.contains(&source.id) {
            target.source_memory_ids.push(source.id.clone());
        }
        for tag in &source.tags {
            if !target.tags.contains(tag) {
                target.tags.push(tag.clone());
            }
        }
        target.valid_from = opt_min(target.valid_from, source.valid_from);
        target.valid_to = opt_max(target.valid_to, source.valid_to);
        target.mentioned_at = opt_max(target.mentioned_at, source.mentioned_at);
        target.proof_count = target.source_memory_ids.len() as u32;
        target.content = text.to_string();
        target.updated_at = now;

        self.storage.update_content_and_meta(&target)?;
        self.memory_index.upsert(&target.id, &target.content);
        Ok(())
    }

    fn execute_merge(&self, source: &MemoryUnit, observation_ids: &[String], text: &str, reason: &str) -> Result<()> {
        let unique: HashSet<&String> = observation_ids.iter().collect();
        if unique.len() < 2 {
            return Err(BankError::Validation("merge requires at least two distinct observation ids".into()));
        }
        let target_id = &observation_ids[0];
        let mut target = self
            .storage
            .get_memory_unit(target_id)?
            .filter(|m| m.bank_id == source.bank_id && m.fact_type == FactType::Observation)
            .ok_or_else(|| BankError::NotFound(format!("observation {target_id} not found in bank")))?;

        if !target.source_memory_ids.contains(&source.id) {
            target.source_memory_ids.push(source.id.clone());
        }
        for tag in &source.tags {
            if !target.tags.contains(tag) {
                target.tags.push(tag.clone());
            }
        }
        target.valid_from = opt_min(target.valid_from, source.valid_from);
        target.valid_to = opt_max(target.valid_to, source.valid_to);
        target.mentioned_at = opt_max(target.mentioned_at, source.mentioned_at);

        let now = Utc::now();
        for merged_id in &observation_ids[1..] {
            if merged_id == target_id {
                continue;
            }
            let Some(merged) = self
                .storage
                .get_memory_unit(merged_id)?
                .filter(|m| m.bank_id == source.bank_id && m.fact_type == FactType::Observation)
            else {
                continue;
            };
            target.history.push(HistoryEntry {
                previous_text: merged.content.clone(),
                changed_at: now,
                reason: reason.to_string(),
                source_memory_id: merged.id.clone(),
            });
            for id in &merged.source_memory_ids {
                if !target.source_memory_ids.contains(id) {
                    target.source_memory_ids.push(id.clone());
                }
            }
            for tag in &merged.tags {
                if !target.tags.contains(tag) {
                    target.tags.push(tag.clone());
                }
            }
            target.valid_from = opt_min(target.valid_from, merged.valid_from);
            target.valid_to = opt_max(target.valid_to, merged.valid_to);
            target.mentioned_at = opt_max(target.mentioned_at, merged.mentioned_at);

            self.storage.delete_memory_unit(&merged.id)?;
            self.memory_index.delete(&merged.id);
        }

        target.proof_count = target.source_memory_ids.len() as u32;
        target.content = text.to_string();
        target.updated_at = now;
        self.storage.update_content_and_meta(&target)?;
        self.memory_index.upsert(&target.id, &target.content);
        Ok(())
    }
}

fn opt_min(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn opt_max(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{Bank, BankConfig, Disposition};
    use crate::embeddings::HashEmbedder;

    fn setup() -> (ConsolidationEngine, Arc<Storage>, Arc<EmbeddingStore>, Bank) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let memory_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
        let now = Utc::now();
        let bank = Bank {
            id: "b1".into(),
            name: "acme".into(),
            description: None,
            config: BankConfig::default(),
            disposition: Disposition::default(),
            mission: None,
            created_at: now,
            updated_at: now,
        };
        storage.create_bank(&bank).unwrap();
        let engine = ConsolidationEngine::new(storage.clone(), memory_index.clone(), Arc::new(RuleBasedActionProvider));
        (engine, storage, memory_index, bank)
    }

    fn insert_world(storage: &Storage, memory_index: &EmbeddingStore, bank_id: &str, content: &str, tags: Vec<String>) -> MemoryUnit {
        let now = Utc::now();
        let unit = MemoryUnit {
            id: ulid::Ulid::new().to_string(),
            bank_id: bank_id.to_string(),
            content: content.to_string(),
            fact_type: FactType::World,
            confidence: 1.0,
            valid_from: None,
            valid_to: None,
            mentioned_at: Some(now),
            occurred_start: None,
            occurred_end: None,
            event_date: None,
            document_id: None,
            chunk_id: None,
            source_text: None,
            tags,
            proof_count: 1,
            source_memory_ids: vec![],
            history: vec![],
            consolidated_at: None,
            created_at: now,
            updated_at: now,
        };
        storage.insert_memory_unit(&unit).unwrap();
        memory_index.upsert(&unit.id, &unit.content);
        unit
    }

    #[test]
    fn creates_observation_when_no_candidate_exists() {
        let (engine, storage, memory_index, bank) = setup();
        insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec![]);
        let report = engine.run_batch(&bank.id, None).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn updates_existing_observation_when_candidate_found() {
        let (engine, storage, memory_index, bank) = setup();
        insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec![]);
        engine.run_batch(&bank.id, None).unwrap();

        insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec![]);
        let report = engine.run_batch(&bank.id, None).unwrap();
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn tag_isolation_prevents_cross_scope_candidate() {
        let (engine, storage, memory_index, bank) = setup();
        insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec!["work".into()]);
        engine.run_batch(&bank.id, None).unwrap();

        insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec!["personal".into()]);
        let report = engine.run_batch(&bank.id, None).unwrap();
        assert_eq!(report.created, 1, "differently-tagged source must not match the existing observation");
    }

    #[test]
    fn merge_unions_sources_and_deletes_merged_rows() {
        let (engine, storage, memory_index, bank) = setup();
        let a = insert_world(&storage, &memory_index, &bank.id, "Peter loves hiking.", vec![]);
        engine.run_batch(&bank.id, None).unwrap();
        let obs_a = storage
            .list_memory_units_by_bank(&bank.id, &crate::storage::MemoryUnitFilter {
                fact_type: Some(FactType::Observation),
                ..Default::default()
            })
            .unwrap()
            .remove(0);

        let b = insert_world(&storage, &memory_index, &bank.id, "unrelated filler content entirely", vec![]);
        let obs_b = MemoryUnit {
            id: ulid::Ulid::new().to_string(),
            content: "independent observation content".into(),
            fact_type: FactType::Observation,
            source_memory_ids: vec![b.id.clone()],
            proof_count: 1,
            ..obs_a.clone()
        };
        storage.insert_memory_unit(&obs_b).unwrap();
        memory_index.upsert(&obs_b.id, &obs_b.content);

        let action = ConsolidationAction::Merge {
            observation_ids: vec![obs_a.id.clone(), obs_b.id.clone()],
            text: "merged content".into(),
            reason: "duplicate coverage".into(),
        };
        engine.execute_action(&a, &action).unwrap();

        assert!(storage.get_memory_unit(&obs_b.id).unwrap().is_none());
        let merged = storage.get_memory_unit(&obs_a.id).unwrap().unwrap();
        assert_eq!(merged.content, "merged content");
        assert!(merged.source_memory_ids.contains(&b.id));
    }
}
