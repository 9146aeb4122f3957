//! Memory Link — a directed, typed, weighted edge between two memories.

use serde::{Deserialize, Serialize};

/// Types of relationship a link can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Entity,
    Semantic,
    Temporal,
    Causal,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Entity => "entity",
            LinkType::Semantic => "semantic",
            LinkType::Temporal => "temporal",
            LinkType::Causal => "causal",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "entity" => Some(LinkType::Entity),
            "semantic" => Some(LinkType::Semantic),
            "temporal" => Some(LinkType::Temporal),
            "causal" => Some(LinkType::Causal),
            _ => None,
        }
    }
}

/// A directed edge `(source_id, target_id, link_type, weight)`. Weight is
/// in `(0,1]`; self-loops are never created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLink {
    pub id: String,
    pub bank_id: String,
    pub source_id: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub weight: f64,
    pub metadata: Option<serde_json::Value>,
}

impl MemoryLink {
    /// No self-loops, weight within range.
    pub fn is_valid(&self) -> bool {
        self.source_id != self.target_id && self.weight > 0.0 && self.weight <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_type_roundtrip() {
        for lt in [
            LinkType::Entity,
            LinkType::Semantic,
            LinkType::Temporal,
            LinkType::Causal,
        ] {
            assert_eq!(LinkType::parse_name(lt.as_str()), Some(lt));
        }
    }

    #[test]
    fn rejects_self_loop() {
        let link = MemoryLink {
            id: "l1".into(),
            bank_id: "b1".into(),
            source_id: "m1".into(),
            target_id: "m1".into(),
            link_type: LinkType::Semantic,
            weight: 0.5,
            metadata: None,
        };
        assert!(!link.is_valid());
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let link = MemoryLink {
            id: "l1".into(),
            bank_id: "b1".into(),
            source_id: "m1".into(),
            target_id: "m2".into(),
            link_type: LinkType::Semantic,
            weight: 0.0,
            metadata: None,
        };
        assert!(!link.is_valid());
    }
}
