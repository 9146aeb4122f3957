//! Retain Pipeline
//!
//! Normalize -> extract -> dedup -> resolve entities -> insert -> create
//! links -> optional consolidate trigger. Each step is a
//! private function on `RetainPipeline` so error-handling-per-fact stays
//! local: one malformed fact is reported in `RetainOutput::errors` without
//! aborting the batch.

pub mod extraction;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::bank::Bank;
use crate::embeddings::EmbeddingStore;
use crate::entity::{self, Entity, EntityCandidate, ResolveDecision};
use crate::error::Result;
use crate::ids::IdGenerator;
use crate::links::{LinkType, MemoryLink};
use crate::memory::MemoryUnit;
use crate::sanitize::sanitize;
use crate::storage::Storage;

use extraction::{ExtractedFact, ExtractionResult, FactExtractor};

/// Temporal-link candidate window, in hours either side of the anchor
/// timestamp.
const TEMPORAL_WINDOW_HOURS: i64 = 24;
/// Maximum temporal neighbors per new fact.
const TEMPORAL_LINK_CAP: usize = 10;
/// Semantic-link acceptance threshold.
const SEMANTIC_LINK_THRESHOLD: f32 = 0.8;
/// Dedup probe depth.
const DEDUP_PROBE_K: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct RetainOptions {
    pub facts: Option<Vec<ExtractedFact>>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub dedup_threshold: Option<f64>,
    pub consolidate: Option<bool>,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
}

pub struct RetainInput {
    pub bank_id: String,
    pub content: String,
    pub options: RetainOptions,
}

#[derive(Debug, Clone)]
pub struct RetainError {
    pub content: String,
    pub message: String,
}

pub struct RetainOutput {
    pub inserted: Vec<MemoryUnit>,
    pub resolved_entities: Vec<Entity>,
    pub created_links: Vec<MemoryLink>,
    pub errors: Vec<RetainError>,
    pub should_consolidate: bool,
}

pub struct RetainPipeline {
    storage: Arc<Storage>,
    memory_index: Arc<EmbeddingStore>,
    entity_index: Arc<EmbeddingStore>,
    extractor: Arc<dyn FactExtractor>,
    ids: IdGenerator,
}

impl RetainPipeline {
    pub fn new(
        storage: Arc<Storage>,
        memory_index: Arc<EmbeddingStore>,
        entity_index: Arc<EmbeddingStore>,
        extractor: Arc<dyn FactExtractor>,
    ) -> Self {
        Self {
            storage,
            memory_index,
            entity_index,
            extractor,
            ids: IdGenerator::new(),
        }
    }

    pub fn retain(&self, input: RetainInput, bank: &Bank) -> Result<RetainOutput> {
        let config = bank.config.clone();
        let normalized = sanitize(input.content.trim());

        let extraction = match input.options.facts.clone() {
            Some(facts) => ExtractionResult {
                facts,
                causal_relations: vec![],
            },
            None => self.extractor.extract(&normalized, &config)?,
        };

        let dedup_threshold = input
            .options
            .dedup_threshold
            .unwrap_or_else(|| config.dedup_threshold_or_default());

        let mut inserted = Vec::new();
        let mut resolved_entities = Vec::new();
        let mut created_links = Vec::new();
        let mut errors = Vec::new();

        for fact in &extraction.facts {
            match self.process_one_fact(fact, &input.bank_id, &input.options, dedup_threshold, &inserted) {
                Ok(Some((unit, entities, links))) => {
                    inserted.push(unit);
                    resolved_entities.extend(entities);
                    created_links.extend(links);
                }
                Ok(None) => {} // deduped
                Err(e) => errors.push(RetainError {
                    content: fact.content.clone(),
                    message: e.to_string(),
                }),
            }
        }

        created_links.extend(self.create_causal_links(&input.bank_id, &extraction, &inserted)?);

        let should_consolidate = input
            .options
            .consolidate
            .unwrap_or_else(|| config.enable_consolidation_or_default());

        Ok(RetainOutput {
            inserted,
            resolved_entities,
            created_links,
            errors,
            should_consolidate,
        })
    }

    fn process_one_fact(
        &self,
        fact: &ExtractedFact,
        bank_id: &str,
        options: &RetainOptions,
        dedup_threshold: f64,
        already_inserted: &[MemoryUnit],
    ) -> Result<Option<(MemoryUnit, Vec<Entity>, Vec<MemoryLink>)>> {
        let content = sanitize(&fact.content);
        if content.is_empty() {
            return Err(crate::error::BankError::Validation("empty fact content".into()));
        }

        if self.is_duplicate(bank_id, &content, dedup_threshold)? {
            return Ok(None);
        }

        let now = Utc::now();
        let mut tags = options.tags.clone();
        tags.extend(fact.tags.clone());
        tags.sort();
        tags.dedup();

        let unit = MemoryUnit {
            id: self.ids.next_string(),
            bank_id: bank_id.to_string(),
            content: content.clone(),
            fact_type: fact.fact_type,
            confidence: fact.confidence.clamp(0.0, 1.0),
            valid_from: None,
            valid_to: None,
            mentioned_at: Some(now),
            occurred_start: None,
            occurred_end: None,
            event_date: fact.event_date.or(options.event_date),
            document_id: options.document_id.clone(),
            chunk_id: options.chunk_id.clone(),
            source_text: None,
            tags,
            proof_count: 1,
            source_memory_ids: vec![],
            history: vec![],
            consolidated_at: None,
            created_at: now,
            updated_at: now,
        };
        unit.check_local_invariants().map_err(crate::error::BankError::Validation)?;

        self.storage.insert_memory_unit(&unit)?;
        self.memory_index.upsert(&unit.id, &unit.content);

        let entities = self.resolve_entities(bank_id, &unit.id, &fact.entities, now)?;

        let mut links = self.create_entity_links(bank_id, &unit, already_inserted)?;
        links.extend(self.create_semantic_links(bank_id, &unit)?);
        links.extend(self.create_temporal_links(bank_id, &unit)?);
        for link in &links {
            self.storage.create_link(link)?;
        }

        Ok(Some((unit, entities, links)))
    }

    /// Dedup: probe the memory vector index for the top-K
    /// hits, filter to the same bank, short-circuit at the first hit
    /// below threshold since hits are distance-sorted.
    fn is_duplicate(&self, bank_id: &str, content: &str, threshold: f64) -> Result<bool> {
        if threshold <= 0.0 {
            return Ok(false);
        }
        let hits = self.memory_index.search(content, DEDUP_PROBE_K);
        for (id, distance) in hits {
            let similarity = 1.0 - distance as f64;
            if similarity < threshold {
                break;
            }
            if let Some(candidate) = self.storage.get_memory_unit(&id)? {
                if candidate.bank_id == bank_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn resolve_entities(&self, bank_id: &str, memory_id: &str, names: &[String], now: DateTime<Utc>) -> Result<Vec<Entity>> {
        if names.is_empty() {
            return Ok(vec![]);
        }
        let existing = self.storage.list_entities_by_bank(bank_id)?;
        let mut resolved = Vec::new();

        for name in names {
            let nearby_count = names.len().saturating_sub(1);
            let candidates: Vec<EntityCandidate> = existing
                .iter()
                .map(|e| EntityCandidate {
                    id: e.id.clone(),
                    name: e.name.clone(),
                    last_updated: e.last_updated,
                })
                .collect();

            let cooccurrence_of = |candidate_id: &str| -> usize {
                existing
                    .iter()
                    .find(|e| e.id == candidate_id)
                    .map(|_| nearby_count.min(1))
                    .unwrap_or(0)
            };

            let decision = entity::resolve(name, &candidates, nearby_count, cooccurrence_of, now);
            let entity_id = match decision {
                ResolveDecision::UseExisting { entity_id, .. } => {
                    self.storage.touch_entity(&entity_id, now)?;
                    entity_id
                }
                ResolveDecision::CreateNew => {
                    let new_entity = Entity {
                        id: self.ids.next_string(),
                        bank_id: bank_id.to_string(),
                        name: name.clone(),
                        entity_type: "unknown".to_string(),
                        description: None,
                        mention_count: 1,
                        first_seen: now,
                        last_updated: now,
                        metadata: None,
                    };
                    self.storage.create_entity(&new_entity)?;
                    self.entity_index.upsert(&new_entity.id, &new_entity.name);
                    let id = new_entity.id.clone();
                    resolved.push(new_entity);
                    id
                }
            };
            self.storage.attach_entity_to_memory(memory_id, &entity_id)?;
            if let Ok(Some(e)) = self.storage.get_entity(&entity_id) {
                if !resolved.iter().any(|r| r.id == e.id) {
                    resolved.push(e);
                }
            }
        }
        Ok(resolved)
    }

    /// Entity links: for every pair of newly inserted facts sharing at
    /// least one entity with an existing same-bank memory.
    fn create_entity_links(&self, bank_id: &str, unit: &MemoryUnit, _already_inserted: &[MemoryUnit]) -> Result<Vec<MemoryLink>> {
        let entity_ids = self.storage.entity_ids_for_memory(&unit.id)?;
        if entity_ids.is_empty() {
            return Ok(vec![]);
        }
        let shared = self.storage.memories_sharing_entities(&unit.id, &entity_ids)?;
        let mut links = Vec::new();
        for (other_id, shared_count) in shared {
            if other_id == unit.id {
                continue;
            }
            let other_entity_count = self.storage.entity_ids_for_memory(&other_id)?.len().max(1);
            let denom = entity_ids.len().max(other_entity_count);
            let weight = (shared_count as f64 / denom as f64).clamp(0.0001, 1.0);
            links.push(MemoryLink {
                id: self.ids.next_string(),
                bank_id: bank_id.to_string(),
                source_id: unit.id.clone(),
                target_id: other_id,
                link_type: LinkType::Entity,
                weight,
                metadata: None,
            });
        }
        Ok(links)
    }

    /// Semantic links: KNN probe against the memory vector index for
    /// hits at or above the acceptance threshold, excluding self.
    fn create_semantic_links(&self, bank_id: &str, unit: &MemoryUnit) -> Result<Vec<MemoryLink>> {
        let hits = self.memory_index.search(&unit.content, DEDUP_PROBE_K + 1);
        let mut links = Vec::new();
        for (id, distance) in hits {
            if id == unit.id {
                continue;
            }
            let similarity = 1.0 - distance as f64;
            if similarity < SEMANTIC_LINK_THRESHOLD as f64 {
                continue;
            }
            if let Some(candidate) = self.storage.get_memory_unit(&id)? {
                if candidate.bank_id != bank_id {
                    continue;
                }
            } else {
                continue;
            }
            links.push(MemoryLink {
                id: self.ids.next_string(),
                bank_id: bank_id.to_string(),
                source_id: unit.id.clone(),
                target_id: id,
                link_type: LinkType::Semantic,
                weight: similarity.clamp(0.0001, 1.0),
                metadata: None,
            });
        }
        Ok(links)
    }

    /// Temporal links: candidates within a ±24h window of `event_date`,
    /// capped at 10 neighbors, weight decaying linearly over the window.
    fn create_temporal_links(&self, bank_id: &str, unit: &MemoryUnit) -> Result<Vec<MemoryLink>> {
        let Some(anchor) = unit
            .event_date
            .or(unit.occurred_start)
            .or(unit.mentioned_at)
        else {
            return Ok(vec![]);
        };
        let window = Duration::hours(TEMPORAL_WINDOW_HOURS);
        let filter = crate::storage::MemoryUnitFilter {
            since: Some(anchor - window),
            until: Some(anchor + window),
            ..Default::default()
        };
        let candidates = self.storage.list_memory_units_by_bank(bank_id, &filter)?;
        let mut links = Vec::new();
        for candidate in candidates {
            if candidate.id == unit.id || links.len() >= TEMPORAL_LINK_CAP {
                continue;
            }
            let candidate_anchor = candidate
                .event_date
                .or(candidate.occurred_start)
                .or(candidate.mentioned_at)
                .unwrap_or(candidate.created_at);
            let delta = (anchor - candidate_anchor).num_milliseconds().unsigned_abs() as f64;
            let window_ms = window.num_milliseconds() as f64;
            let weight = (1.0 - delta / window_ms).max(0.3);
            links.push(MemoryLink {
                id: self.ids.next_string(),
                bank_id: bank_id.to_string(),
                source_id: unit.id.clone(),
                target_id: candidate.id,
                link_type: LinkType::Temporal,
                weight,
                metadata: None,
            });
        }
        Ok(links)
    }

    /// Causal links from `causal_relations` indices into the extraction's
    /// fact list, resolved against the freshly inserted units in order.
    fn create_causal_links(&self, bank_id: &str, extraction: &ExtractionResult, inserted: &[MemoryUnit]) -> Result<Vec<MemoryLink>> {
        let mut links = Vec::new();
        for relation in &extraction.causal_relations {
            let (Some(source), Some(target)) = (inserted.get(relation.source_index), inserted.get(relation.target_index)) else {
                continue;
            };
            if source.id == target.id {
                continue;
            }
            let link = MemoryLink {
                id: self.ids.next_string(),
                bank_id: bank_id.to_string(),
                source_id: source.id.clone(),
                target_id: target.id.clone(),
                link_type: LinkType::Causal,
                weight: relation.strength.clamp(0.0001, 1.0),
                metadata: Some(serde_json::json!({ "relation_type": relation.relation_type })),
            };
            self.storage.create_link(&link)?;
            links.push(link);
        }
        Ok(links)
    }
}

/// Process a batch of independent retain items, never aborting the batch
/// on a single item's error.
pub fn retain_batch(pipeline: &RetainPipeline, bank: &Bank, items: Vec<RetainInput>) -> Vec<Result<RetainOutput>> {
    items.into_iter().map(|item| pipeline.retain(item, bank)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{BankConfig, Disposition};
    use crate::embeddings::HashEmbedder;
    use crate::memory::FactType;

    fn setup() -> (RetainPipeline, Bank) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let memory_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
        let entity_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
        let extractor: Arc<dyn FactExtractor> = Arc::new(extraction::RuleBasedExtractor);
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
        (RetainPipeline::new(storage, memory_index, entity_index, extractor), bank)
    }

    #[test]
    fn retain_inserts_one_unit_per_line() {
        let (pipeline, bank) = setup();
        let input = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.\nBob uses Vim.".into(),
            options: RetainOptions::default(),
        };
        let output = pipeline.retain(input, &bank).unwrap();
        assert_eq!(output.inserted.len(), 2);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn retain_resolves_shared_entities() {
        let (pipeline, bank) = setup();
        let input = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.\nPeter also loves climbing.".into(),
            options: RetainOptions::default(),
        };
        let output = pipeline.retain(input, &bank).unwrap();
        let entity_names: Vec<&str> = output.resolved_entities.iter().map(|e| e.name.as_str()).collect();
        assert!(entity_names.contains(&"Peter"));
    }

    #[test]
    fn dedup_skips_near_identical_content() {
        let (pipeline, bank) = setup();
        let first = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.".into(),
            options: RetainOptions::default(),
        };
        pipeline.retain(first, &bank).unwrap();
        let second = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.".into(),
            options: RetainOptions::default(),
        };
        let output = pipeline.retain(second, &bank).unwrap();
        assert!(output.inserted.is_empty());
    }

    #[test]
    fn dedup_threshold_zero_disables_dedup() {
        let (pipeline, bank) = setup();
        let opts = RetainOptions {
            dedup_threshold: Some(0.0),
            ..Default::default()
        };
        let first = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.".into(),
            options: opts.clone(),
        };
        pipeline.retain(first, &bank).unwrap();
        let second = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.".into(),
            options: opts,
        };
        let output = pipeline.retain(second, &bank).unwrap();
        assert_eq!(output.inserted.len(), 1);
    }

    #[test]
    fn empty_fact_surfaces_as_per_fact_error_not_abort() {
        let (pipeline, bank) = setup();
        let input = RetainInput {
            bank_id: bank.id.clone(),
            content: "Peter loves hiking.".into(),
            options: RetainOptions {
                facts: Some(vec![
                    ExtractedFact {
                        content: "   ".into(),
                        fact_type: FactType::World,
                        confidence: 1.0,
                        entities: vec![],
                        tags: vec![],
                        event_date: None,
                    },
                    ExtractedFact {
                        content: "Valid fact.".into(),
                        fact_type: FactType::World,
                        confidence: 1.0,
                        entities: vec![],
                        tags: vec![],
                        event_date: None,
                    },
                ]),
                ..Default::default()
            },
        };
        let output = pipeline.retain(input, &bank).unwrap();
        assert_eq!(output.inserted.len(), 1);
        assert_eq!(output.errors.len(), 1);
    }
}
