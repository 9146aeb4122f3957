//! Fact extraction
//!
//! Extraction is trait-injected so the retain pipeline never depends on a
//! concrete LLM client, the same way embedding generation is injected
//! behind `EmbeddingProvider`. The rule-based extractor below is the
//! deterministic default every test exercises; real deployments supply an
//! LLM-backed implementation out of process.

use serde::{Deserialize, Serialize};

use crate::bank::{BankConfig, ExtractionMode};
use crate::error::{BankError, Result};
use crate::memory::FactType;

/// One fact as proposed by extraction, before entity resolution or
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFact {
    pub content: String,
    pub fact_type: FactType,
    pub confidence: f64,
    pub entities: Vec<String>,
    pub tags: Vec<String>,
    pub event_date: Option<chrono::DateTime<chrono::Utc>>,
}

/// A causal relationship between two extracted facts, indices into the
/// same extraction response's fact list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalRelation {
    pub source_index: usize,
    pub target_index: usize,
    pub relation_type: String,
    pub strength: f64,
}

/// The full result of one extraction call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub facts: Vec<ExtractedFact>,
    #[serde(default)]
    pub causal_relations: Vec<CausalRelation>,
}

/// Anything that turns normalized input text into a set of facts.
pub trait FactExtractor: Send + Sync {
    fn extract(&self, content: &str, config: &BankConfig) -> Result<ExtractionResult>;
}

/// Deterministic, LLM-free extractor: one fact per non-empty line,
/// `fact_type = world`, confidence 1.0, entities drawn from capitalized
/// words. Exists so the retain pipeline and its tests never require a
/// live LLM.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    fn guess_entities(line: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut entities = Vec::new();
        for word in line.split_whitespace() {
            let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
            if trimmed.len() > 1
                && trimmed.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
                && seen.insert(trimmed.to_string())
            {
                entities.push(trimmed.to_string());
            }
        }
        entities
    }
}

impl FactExtractor for RuleBasedExtractor {
    fn extract(&self, content: &str, config: &BankConfig) -> Result<ExtractionResult> {
        if matches!(config.extraction_mode_or_default(), ExtractionMode::Custom) && config.custom_guidelines.is_none() {
            return Err(BankError::Validation(
                "custom extraction mode requires custom_guidelines".into(),
            ));
        }
        let facts = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| ExtractedFact {
                content: line.to_string(),
                fact_type: FactType::World,
                confidence: 1.0,
                entities: Self::guess_entities(line),
                tags: vec![],
                event_date: None,
            })
            .collect();
        Ok(ExtractionResult {
            facts,
            causal_relations: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_fact_per_nonempty_line() {
        let extractor = RuleBasedExtractor;
        let result = extractor
            .extract("Peter loves hiking.\n\nBob uses Vim.", &BankConfig::default())
            .unwrap();
        assert_eq!(result.facts.len(), 2);
    }

    #[test]
    fn capitalized_words_become_entities() {
        let extractor = RuleBasedExtractor;
        let result = extractor.extract("Peter met Bob in Berlin.", &BankConfig::default()).unwrap();
        assert_eq!(result.facts[0].entities, vec!["Peter", "Bob", "Berlin"]);
    }

    #[test]
    fn custom_mode_without_guidelines_errors() {
        let extractor = RuleBasedExtractor;
        let config = BankConfig {
            extraction_mode: Some(ExtractionMode::Custom),
            ..Default::default()
        };
        assert!(extractor.extract("anything", &config).is_err());
    }
}
