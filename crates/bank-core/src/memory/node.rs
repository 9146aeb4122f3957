//! Memory Unit — the central entity
//!
//! Each unit represents one atomic statement with provenance, temporal
//! metadata, and confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four fact kinds. A small closed sum type — `Observation`
/// is the only kind carrying non-empty `source_memory_ids`/`history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Experience,
    World,
    Observation,
    Opinion,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Experience => "experience",
            FactType::World => "world",
            FactType::Observation => "observation",
            FactType::Opinion => "opinion",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "experience" => Some(FactType::Experience),
            "world" => Some(FactType::World),
            "observation" => Some(FactType::Observation),
            "opinion" => Some(FactType::Opinion),
            _ => None,
        }
    }

    /// Fact types eligible as `source_memory_ids` referents of an
    /// observation.
    pub fn is_observable_source(&self) -> bool {
        matches!(self, FactType::Experience | FactType::World)
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in a memory unit's append-only history, written only by
/// consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub previous_text: String,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
    pub source_memory_id: String,
}

/// The central entity: one atomic statement with provenance and temporal
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUnit {
    pub id: String,
    pub bank_id: String,
    pub content: String,
    pub fact_type: FactType,
    pub confidence: f64,

    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub mentioned_at: Option<DateTime<Utc>>,
    pub occurred_start: Option<DateTime<Utc>>,
    pub occurred_end: Option<DateTime<Utc>>,
    pub event_date: Option<DateTime<Utc>>,

    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub source_text: Option<String>,

    pub tags: Vec<String>,
    pub proof_count: u32,
    pub source_memory_ids: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub consolidated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryUnit {
    /// Check the invariants that can be verified locally, without a store
    /// lookup of the referenced ids.
    pub fn check_local_invariants(&self) -> Result<(), String> {
        if self.fact_type == FactType::Observation {
            if self.source_memory_ids.is_empty() {
                return Err("observation must have non-empty source_memory_ids".into());
            }
        } else if !self.source_memory_ids.is_empty() {
            return Err("only observations may carry source_memory_ids".into());
        }
        if self.proof_count as usize != self.source_memory_ids.len().max(1) {
            // Raw facts with no sources still carry proof_count >= 1.
            if !(self.source_memory_ids.is_empty() && self.proof_count >= 1) {
                return Err("proof_count must equal |source_memory_ids|".into());
            }
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("confidence must be in [0,1]".into());
        }
        Ok(())
    }

    pub fn is_observation(&self) -> bool {
        self.fact_type == FactType::Observation
    }
}

/// Tag matching strategy for recall/consolidation filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TagsMatch {
    #[default]
    Any,
    All,
    AllStrict,
}

impl TagsMatch {
    /// `true` if `candidate`'s tags satisfy `required` under this strategy.
    pub fn matches(&self, required: &[String], candidate: &[String]) -> bool {
        if required.is_empty() {
            return true;
        }
        match self {
            TagsMatch::Any => required.iter().any(|t| candidate.contains(t)),
            TagsMatch::All => required.iter().all(|t| candidate.contains(t)),
            TagsMatch::AllStrict => {
                required.iter().all(|t| candidate.contains(t)) && candidate.len() == required.len()
            }
        }
    }
}
