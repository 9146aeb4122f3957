//! Recall Engine
//!
//! Four independent retrievers (semantic, fulltext, graph, temporal),
//! fused with reciprocal rank fusion generalized from two ranked lists to
//! N, then post-filtered and truncated to a token budget.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::embeddings::EmbeddingStore;
use crate::error::Result;
use crate::links::LinkType;
use crate::memory::{FactType, MemoryUnit, TagsMatch};
use crate::search::{reciprocal_rank_fusion, sanitize_fts5_query};
use crate::storage::{MemoryUnitFilter, Storage};

/// Over-fetch factor applied to `limit` when probing the semantic and
/// graph retrievers.
const OVER_FETCH_FACTOR: usize = 3;
/// Bounded graph walk depth.
const GRAPH_HOP_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecallMethod {
    Semantic,
    Fulltext,
    Graph,
    Temporal,
}

impl RecallMethod {
    pub const ALL: [RecallMethod; 4] = [
        RecallMethod::Semantic,
        RecallMethod::Fulltext,
        RecallMethod::Graph,
        RecallMethod::Temporal,
    ];
}

#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub methods: Vec<RecallMethod>,
    pub limit: usize,
    pub max_tokens: Option<usize>,
    pub fact_types: Vec<FactType>,
    pub tags: Vec<String>,
    pub tags_match: TagsMatch,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub seed_memory_ids: Vec<String>,
    pub max_entity_frequency: Option<u32>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            methods: RecallMethod::ALL.to_vec(),
            limit: 10,
            max_tokens: None,
            fact_types: vec![FactType::Experience, FactType::World, FactType::Observation],
            tags: vec![],
            tags_match: TagsMatch::Any,
            time_range: None,
            seed_memory_ids: vec![],
            max_entity_frequency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecallHit {
    pub memory: MemoryUnit,
    pub score: f64,
    pub sources: Vec<RecallMethod>,
    pub entity_names: Vec<String>,
}

pub struct RecallEngine {
    storage: Arc<Storage>,
    memory_index: Arc<EmbeddingStore>,
}

impl RecallEngine {
    pub fn new(storage: Arc<Storage>, memory_index: Arc<EmbeddingStore>) -> Self {
        Self { storage, memory_index }
    }

    pub fn recall(&self, bank_id: &str, query: &str, options: &RecallOptions) -> Result<Vec<RecallHit>> {
        let mut ranked_lists: Vec<(RecallMethod, Vec<String>)> = Vec::new();
        let over_fetch = options.limit.max(1) * OVER_FETCH_FACTOR;

        let semantic_ids = if options.methods.contains(&RecallMethod::Semantic) {
            self.semantic_retrieve(bank_id, query, over_fetch)?
        } else {
            vec![]
        };
        if options.methods.contains(&RecallMethod::Semantic) {
            ranked_lists.push((RecallMethod::Semantic, semantic_ids.clone()));
        }
        if options.methods.contains(&RecallMethod::Fulltext) {
            ranked_lists.push((RecallMethod::Fulltext, self.fulltext_retrieve(bank_id, query, options.limit as u32)?));
        }
        if options.methods.contains(&RecallMethod::Graph) {
            let seeds = if !options.seed_memory_ids.is_empty() {
                options.seed_memory_ids.clone()
            } else {
                semantic_ids.iter().take(options.limit).cloned().collect()
            };
            ranked_lists.push((
                RecallMethod::Graph,
                self.graph_retrieve(bank_id, &seeds, options.max_entity_frequency, over_fetch)?,
            ));
        }
        if options.methods.contains(&RecallMethod::Temporal) {
            ranked_lists.push((RecallMethod::Temporal, self.temporal_retrieve(bank_id, options.time_range, over_fetch)?));
        }

        let lists_only: Vec<Vec<String>> = ranked_lists.iter().map(|(_, l)| l.clone()).collect();
        let fused = reciprocal_rank_fusion(&lists_only);

        let mut hits = Vec::new();
        for (id, score) in fused {
            let Some(memory) = self.storage.get_memory_unit(&id)? else {
                continue;
            };
            if memory.bank_id != bank_id {
                continue;
            }
            if !options.fact_types.contains(&memory.fact_type) {
                continue;
            }
            if !options.tags_match.matches(&options.tags, &memory.tags) {
                continue;
            }
            if let Some((start, end)) = options.time_range {
                let overlaps = match (memory.valid_from, memory.valid_to) {
                    (Some(from), Some(to)) => from <= end && to >= start,
                    (Some(from), None) => from <= end,
                    (None, Some(to)) => to >= start,
                    (None, None) => false,
                };
                if !overlaps {
                    continue;
                }
            }
            let sources: Vec<RecallMethod> = ranked_lists
                .iter()
                .filter(|(_, ids)| ids.contains(&id))
                .map(|(method, _)| *method)
                .collect();
            hits.push(RecallHit {
                memory,
                score,
                sources,
                entity_names: vec![],
            });
            if hits.len() >= options.limit {
                break;
            }
        }

        let ids: Vec<String> = hits.iter().map(|h| h.memory.id.clone()).collect();
        let entity_names = self.storage.entity_names_for_memories(&ids)?;
        for hit in &mut hits {
            if let Some(names) = entity_names.get(&hit.memory.id) {
                hit.entity_names = names.clone();
            }
        }

        Ok(Self::truncate_to_token_budget(hits, options.max_tokens))
    }

    /// Semantic retriever: vector KNN over-fetched by [`OVER_FETCH_FACTOR`],
    /// scoped to `bank_id`.
    fn semantic_retrieve(&self, bank_id: &str, query: &str, fetch: usize) -> Result<Vec<String>> {
        let hits = self.memory_index.search(query, fetch);
        let mut ids = Vec::new();
        for (id, _distance) in hits {
            if let Some(unit) = self.storage.get_memory_unit(&id)? {
                if unit.bank_id == bank_id {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Fulltext retriever: FTS5 MATCH scoped to `bank_id`, already ranked
    /// by BM25 in `Storage::fulltext_search`.
    fn fulltext_retrieve(&self, bank_id: &str, query: &str, limit: u32) -> Result<Vec<String>> {
        let sanitized = sanitize_fts5_query(query);
        self.storage.fulltext_search(bank_id, &sanitized, limit)
    }

    /// Graph retriever: bounded BFS walk from `seeds` over entity/
    /// semantic/causal edges, dropping edges through hub entities whose
    /// bank-wide mention_count exceeds `max_entity_frequency`.
    fn graph_retrieve(&self, bank_id: &str, seeds: &[String], max_entity_frequency: Option<u32>, cap: usize) -> Result<Vec<String>> {
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut frontier: Vec<String> = seeds.to_vec();
        let mut order = Vec::new();

        for _ in 0..GRAPH_HOP_LIMIT {
            if order.len() >= cap {
                break;
            }
            let mut next_frontier = Vec::new();
            for id in &frontier {
                let links = self.storage.list_links_for_memory(id)?;
                for link in links {
                    if !matches!(link.link_type, LinkType::Entity | LinkType::Semantic | LinkType::Causal) {
                        continue;
                    }
                    let neighbor = if link.source_id == *id { link.target_id } else { link.source_id };
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    let Some(candidate) = self.storage.get_memory_unit(&neighbor)? else {
                        continue;
                    };
                    if candidate.bank_id != bank_id {
                        continue;
                    }
                    if link.link_type == LinkType::Entity {
                        if let Some(max_freq) = max_entity_frequency {
                            if self.is_hub_only_edge(id, &neighbor, max_freq)? {
                                continue;
                            }
                        }
                    }
                    visited.insert(neighbor.clone());
                    order.push(neighbor.clone());
                    next_frontier.push(neighbor);
                    if order.len() >= cap {
                        break;
                    }
                }
                if order.len() >= cap {
                    break;
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(order)
    }

    /// `true` if every entity shared between `a` and `b` is a hub (mention
    /// count over `max_freq`), meaning the edge carries no discriminating
    /// signal and should be dropped.
    fn is_hub_only_edge(&self, a: &str, b: &str, max_freq: u32) -> Result<bool> {
        let entities_a: HashSet<String> = self.storage.entity_ids_for_memory(a)?.into_iter().collect();
        let entities_b: HashSet<String> = self.storage.entity_ids_for_memory(b)?.into_iter().collect();
        let shared: Vec<&String> = entities_a.intersection(&entities_b).collect();
        if shared.is_empty() {
            return Ok(false);
        }
        for entity_id in shared {
            match self.storage.get_entity(entity_id)? {
                Some(entity) if entity.mention_count <= max_freq => return Ok(false),
                _ => continue,
            }
        }
        Ok(true)
    }

    /// Temporal retriever: range scan on `valid_from`/`valid_to`
    /// overlapping `time_range`, ordered by proximity to the range's
    /// midpoint (falls back to `created_at` ordering with no range given).
    fn temporal_retrieve(&self, bank_id: &str, time_range: Option<(DateTime<Utc>, DateTime<Utc>)>, limit: usize) -> Result<Vec<String>> {
        let filter = MemoryUnitFilter {
            since: time_range.map(|(start, _)| start),
            until: time_range.map(|(_, end)| end),
            limit: Some(limit as u32),
            ..Default::default()
        };
        let mut units = self.storage.list_memory_units_by_bank(bank_id, &filter)?;
        if let Some((start, end)) = time_range {
            let midpoint = start + (end - start) / 2;
            units.sort_by_key(|u| {
                let anchor = u.valid_from.or(u.mentioned_at).unwrap_or(u.created_at);
                (anchor - midpoint).num_milliseconds().abs()
            });
        }
        Ok(units.into_iter().map(|u| u.id).collect())
    }

    /// Accumulate `hits` in fused order until the chars/4 token estimate
    /// would exceed `max_tokens`, always keeping at least the top hit.
    fn truncate_to_token_budget(hits: Vec<RecallHit>, max_tokens: Option<usize>) -> Vec<RecallHit> {
        let Some(budget) = max_tokens else {
            return hits;
        };
        let mut kept = Vec::new();
        let mut total = 0usize;
        for hit in hits {
            let estimate = hit.memory.content.len() / 4;
            if !kept.is_empty() && total + estimate > budget {
                break;
            }
            total += estimate;
            kept.push(hit);
        }
        kept
    }
}
