//! End-to-end scenarios spanning retain, recall, and consolidation
//! together against a real (in-memory) store, as opposed to the
//! module-local `#[cfg(test)]` units that each exercise one stage alone.

use std::sync::Arc;

use bank_core::bank::{Bank, BankConfig, Disposition};
use bank_core::consolidation::{ConsolidationAction, ConsolidationActionProvider, ConsolidationEngine, CandidateObservation, RuleBasedActionProvider};
use bank_core::embeddings::{EmbeddingStore, HashEmbedder};
use bank_core::error::Result as BankResult;
use bank_core::ids::IdGenerator;
use bank_core::memory::{FactType, MemoryUnit};
use bank_core::recall::{RecallEngine, RecallMethod, RecallOptions};
use bank_core::retain::extraction::RuleBasedExtractor;
use bank_core::retain::{RetainInput, RetainOptions, RetainPipeline};
use bank_core::storage::Storage;
use chrono::Utc;

fn setup() -> (Storage, Arc<EmbeddingStore>, Bank) {
    let storage = Storage::open_in_memory().unwrap();
    let memory_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
    let now = Utc::now();
    let bank = Bank {
        id: IdGenerator::new().next_string(),
        name: "acme".into(),
        description: None,
        config: BankConfig::default(),
        disposition: Disposition::default(),
        mission: None,
        created_at: now,
        updated_at: now,
    };
    storage.create_bank(&bank).unwrap();
    (storage, memory_index, bank)
}

fn pipeline(storage: Arc<Storage>, memory_index: Arc<EmbeddingStore>) -> RetainPipeline {
    let entity_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
    RetainPipeline::new(storage, memory_index, entity_index, Arc::new(RuleBasedExtractor))
}

/// Scenario 1: retaining identical content twice at the default dedup
/// threshold inserts nothing the second time.
#[test]
fn dedup_at_default_threshold_drops_repeat_content() {
    let (storage, memory_index, bank) = setup();
    let storage = Arc::new(storage);
    let p = pipeline(storage.clone(), memory_index);

    let first = p
        .retain(
            RetainInput {
                bank_id: bank.id.clone(),
                content: "Peter loves hiking".into(),
                options: RetainOptions {
                    dedup_threshold: Some(0.92),
                    consolidate: Some(false),
                    ..Default::default()
                },
            },
            &bank,
        )
        .unwrap();
    assert_eq!(first.inserted.len(), 1);

    let second = p
        .retain(
            RetainInput {
                bank_id: bank.id.clone(),
                content: "Peter loves hiking".into(),
                options: RetainOptions {
                    dedup_threshold: Some(0.92),
                    consolidate: Some(false),
                    ..Default::default()
                },
            },
            &bank,
        )
        .unwrap();
    assert_eq!(second.inserted.len(), 0);
}

/// Scenario 2: two distinct facts, zero existing observations, each
/// consolidates into its own brand-new observation.
#[test]
fn consolidation_creates_one_observation_per_unmatched_fact() {
    let (storage, memory_index, bank) = setup();
    let storage = Arc::new(storage);
    let p = pipeline(storage.clone(), memory_index.clone());

    for content in ["Bob prefers dark mode", "Bob uses Vim"] {
        let out = p
            .retain(
                RetainInput {
                    bank_id: bank.id.clone(),
                    content: content.into(),
                    options: RetainOptions {
                        dedup_threshold: Some(0.0),
                        consolidate: Some(false),
                        ..Default::default()
                    },
                },
                &bank,
            )
            .unwrap();
        assert_eq!(out.inserted.len(), 1);
    }

    let engine = ConsolidationEngine::new(storage.clone(), memory_index, Arc::new(RuleBasedActionProvider));
    let report = engine.run_batch(&bank.id, None).unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(report.merged, 0);
    assert_eq!(report.skipped, 0);

    let observations: Vec<MemoryUnit> = storage
        .list_memory_units_by_bank(&bank.id, &Default::default())
        .unwrap()
        .into_iter()
        .filter(|m| m.fact_type == FactType::Observation)
        .collect();
    assert_eq!(observations.len(), 2);
    for obs in &observations {
        assert_eq!(obs.source_memory_ids.len(), 1);
    }
}

/// A provider that always merges every candidate it's offered into one
/// observation, used to drive the merge path without a live LLM.
struct AlwaysMergeProvider;

impl ConsolidationActionProvider for AlwaysMergeProvider {
    fn propose(&self, source: &bank_core::memory::MemoryUnit, candidates: &[CandidateObservation]) -> BankResult<Vec<ConsolidationAction>> {
        let _ = source;
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        Ok(vec![ConsolidationAction::Merge {
            observation_ids: ids,
            text: "Alice likes sushi and Japanese food".into(),
            reason: "corroborating sources".into(),
        }])
    }
}

/// Scenario 3: consolidating a new source against two existing,
/// semantically related observations merges them into one survivor.
#[test]
fn consolidation_merges_related_observations() {
    let (storage, memory_index, bank) = setup();
    let storage = Arc::new(storage);
    let ids = IdGenerator::new();
    let now = Utc::now();

    let a1 = MemoryUnit {
        id: ids.next_string(),
        bank_id: bank.id.clone(),
        content: "Alice likes sushi".into(),
        fact_type: FactType::Observation,
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
        tags: vec![],
        proof_count: 1,
        source_memory_ids: vec![ids.next_string()],
        history: vec![],
        consolidated_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    storage.insert_memory_unit(&a1).unwrap();
    memory_index.upsert(&a1.id, &a1.content);

    let mut a2 = a1.clone();
    a2.id = ids.next_string();
    a2.content = "Alice likes Japanese food".into();
    a2.source_memory_ids = vec![ids.next_string()];
    storage.insert_memory_unit(&a2).unwrap();
    memory_index.upsert(&a2.id, &a2.content);

    let p = pipeline(storage.clone(), memory_index.clone());
    let retained = p
        .retain(
            RetainInput {
                bank_id: bank.id.clone(),
                content: "Alice often chooses sushi restaurants".into(),
                options: RetainOptions { dedup_threshold: Some(0.0), consolidate: Some(false), ..Default::default() },
            },
            &bank,
        )
        .unwrap();
    assert_eq!(retained.inserted.len(), 1);

    let engine = ConsolidationEngine::new(storage.clone(), memory_index, Arc::new(AlwaysMergeProvider));
    let report = engine.run_batch(&bank.id, None).unwrap();
    assert_eq!(report.merged, 1);

    let survivors: Vec<MemoryUnit> = storage
        .list_memory_units_by_bank(&bank.id, &Default::default())
        .unwrap()
        .into_iter()
        .filter(|m| m.fact_type == FactType::Observation)
        .collect();
    assert_eq!(survivors.len(), 1);
    assert!(survivors[0].source_memory_ids.len() >= 3);
    assert!(storage.get_memory_unit(&a2.id).unwrap().is_none() || storage.get_memory_unit(&a1.id).unwrap().is_none());
}

/// Scenario 5: two facts sharing an entity link to each other in graph
/// recall even though only one is in the semantic seed set.
#[test]
fn graph_recall_surfaces_memories_via_shared_entity() {
    let (storage, memory_index, bank) = setup();
    let storage = Arc::new(storage);
    let p = pipeline(storage.clone(), memory_index.clone());

    let first = p
        .retain(
            RetainInput {
                bank_id: bank.id.clone(),
                content: "Peter works at Acme".into(),
                options: RetainOptions { dedup_threshold: Some(0.0), consolidate: Some(false), ..Default::default() },
            },
            &bank,
        )
        .unwrap();
    assert_eq!(first.inserted.len(), 1);
    let seed_id = first.inserted[0].id.clone();

    let second = p
        .retain(
            RetainInput {
                bank_id: bank.id.clone(),
                content: "Peter loves hiking".into(),
                options: RetainOptions { dedup_threshold: Some(0.0), consolidate: Some(false), ..Default::default() },
            },
            &bank,
        )
        .unwrap();
    assert_eq!(second.inserted.len(), 1);

    let engine = RecallEngine::new(storage, memory_index);
    let hits = engine
        .recall(
            &bank.id,
            "Peter",
            &RecallOptions {
                methods: vec![RecallMethod::Graph],
                seed_memory_ids: vec![seed_id],
                ..Default::default()
            },
        )
        .unwrap();

    assert!(hits.iter().any(|h| h.memory.id == second.inserted[0].id));
}

/// Boundary: `consolidate` on a bank with nothing unconsolidated is a
/// true no-op.
#[test]
fn consolidate_with_nothing_pending_makes_no_writes() {
    let (storage, memory_index, bank) = setup();
    let storage = Arc::new(storage);
    let engine = ConsolidationEngine::new(storage.clone(), memory_index, Arc::new(RuleBasedActionProvider));

    let report = engine.run_batch(&bank.id, None).unwrap();
    assert_eq!(report.processed, 0);

    let units = storage.list_memory_units_by_bank(&bank.id, &Default::default()).unwrap();
    assert!(units.is_empty());
}
