//! Entity — named things the bank has learned about, and the resolver that
//! maps a proposed `(name, type)` onto an existing entity or signals
//! "create new".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity recognized by the bank. Name is case-insensitive unique
/// within a bank post-resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub bank_id: String,
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    pub mention_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// A candidate entity under consideration for resolution, decoupled from
/// storage so the scoring function stays pure and unit-testable.
#[derive(Debug, Clone)]
pub struct EntityCandidate {
    pub id: String,
    pub name: String,
    pub last_updated: DateTime<Utc>,
}

/// Outcome of a resolve attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveDecision {
    UseExisting { entity_id: String, score: f64 },
    CreateNew,
}

/// Acceptance threshold for `resolve`.
pub const RESOLVE_ACCEPT_THRESHOLD: f64 = 0.6;

const NAME_SIMILARITY_WEIGHT: f64 = 0.5;
const COOCCURRENCE_WEIGHT: f64 = 0.3;
const RECENCY_WEIGHT: f64 = 0.2;
const RECENCY_WINDOW_DAYS: f64 = 7.0;

/// Dice bigram coefficient on lowercased strings, used for name similarity.
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 2 {
            return vec![];
        }
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let bg_a = bigrams(&a);
    let bg_b = bigrams(&b);
    if bg_a.is_empty() || bg_b.is_empty() {
        return 0.0;
    }
    let mut b_remaining = bg_b.clone();
    let mut matches = 0usize;
    for pair in &bg_a {
        if let Some(pos) = b_remaining.iter().position(|p| p == pair) {
            b_remaining.remove(pos);
            matches += 1;
        }
    }
    (2.0 * matches as f64) / (bg_a.len() + bg_b.len()) as f64
}

/// Temporal recency decay: `max(0, 1 - days_since_last_update / 7)`.
pub fn recency_score(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - last_updated).num_milliseconds() as f64 / 86_400_000.0;
    (1.0 - days.max(0.0) / RECENCY_WINDOW_DAYS).max(0.0)
}

/// Weighted composite resolution score for one candidate against a
/// proposed name, given the set of entities mentioned alongside it
/// ("nearby" entities) and how many of those the candidate co-occurs with.
pub fn resolution_score(
    proposed_name: &str,
    candidate: &EntityCandidate,
    nearby_count: usize,
    cooccurrence_count: usize,
    now: DateTime<Utc>,
) -> f64 {
    let name_score = dice_coefficient(proposed_name, &candidate.name);
    let cooccurrence = if nearby_count == 0 {
        0.0
    } else {
        (cooccurrence_count as f64 / nearby_count as f64).min(1.0)
    };
    let recency = recency_score(candidate.last_updated, now);

    name_score * NAME_SIMILARITY_WEIGHT
        + cooccurrence * COOCCURRENCE_WEIGHT
        + recency * RECENCY_WEIGHT
}

/// Resolve a proposed entity name against the bank's known entities.
/// `nearby_names` are the other entity names mentioned in the same input
/// (used for the co-occurrence term); `cooccurrence_of` maps a candidate id
/// to how many of `nearby_names` it has historically co-occurred with.
pub fn resolve(
    proposed_name: &str,
    candidates: &[EntityCandidate],
    nearby_count: usize,
    cooccurrence_of: impl Fn(&str) -> usize,
    now: DateTime<Utc>,
) -> ResolveDecision {
    let mut best: Option<(String, f64)> = None;
    for candidate in candidates {
        let score = resolution_score(
            proposed_name,
            candidate,
            nearby_count,
            cooccurrence_of(&candidate.id),
            now,
        );
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((candidate.id.clone(), score));
        }
    }
    match best {
        Some((id, score)) if score >= RESOLVE_ACCEPT_THRESHOLD => {
            ResolveDecision::UseExisting {
                entity_id: id,
                score,
            }
        }
        _ => ResolveDecision::CreateNew,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn dice_identical_strings_is_one() {
        assert_eq!(dice_coefficient("Peter", "peter"), 1.0);
    }

    #[test]
    fn dice_disjoint_strings_is_zero() {
        assert_eq!(dice_coefficient("abc", "xyz"), 0.0);
    }

    #[test]
    fn dice_partial_overlap() {
        let score = dice_coefficient("night", "nacht");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn recency_decays_to_zero_after_window() {
        let now = Utc::now();
        assert_eq!(recency_score(now, now), 1.0);
        assert_eq!(recency_score(now - Duration::days(8), now), 0.0);
        let mid = recency_score(now - Duration::days(3), now);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn resolve_creates_new_when_no_candidates() {
        let decision = resolve("Peter", &[], 0, |_| 0, Utc::now());
        assert_eq!(decision, ResolveDecision::CreateNew);
    }

    #[test]
    fn resolve_uses_existing_on_strong_name_match_and_cooccurrence() {
        let now = Utc::now();
        let candidates = vec![EntityCandidate {
            id: "e1".into(),
            name: "Peter".into(),
            last_updated: now,
        }];
        let decision = resolve("Peter", &candidates, 2, |_| 2, now);
        match decision {
            ResolveDecision::UseExisting { entity_id, .. } => assert_eq!(entity_id, "e1"),
            ResolveDecision::CreateNew => panic!("expected UseExisting"),
        }
    }

    #[test]
    fn resolve_below_threshold_creates_new() {
        let now = Utc::now();
        let candidates = vec![EntityCandidate {
            id: "e1".into(),
            name: "Zzyzx".into(),
            last_updated: now - Duration::days(30),
        }];
        let decision = resolve("Peter", &candidates, 0, |_| 0, now);
        assert_eq!(decision, ResolveDecision::CreateNew);
    }
}
