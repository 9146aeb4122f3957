//! Reciprocal rank fusion
//!
//! Generalized from a two-list (keyword + semantic) RRF merge into an
//! N-list fusion so the recall engine can combine semantic, full-text,
//! graph, and temporal retrievers in one pass.

use std::collections::HashMap;

/// RRF damping constant, left at `60.0`, the standard value from the
/// original RRF paper; nothing about this
/// domain argues for a different curve.
pub const RRF_K: f64 = 60.0;

/// Fuse any number of ranked id lists (best match first in each list) into
/// a single list ordered by descending fused score.
pub fn reciprocal_rank_fusion(ranked_lists: &[Vec<String>]) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in ranked_lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
        }
    }
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_in_every_list_ranks_highest() {
        let lists = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
            vec!["c".to_string(), "b".to_string(), "a".to_string()],
        ];
        let fused = reciprocal_rank_fusion(&lists);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn id_absent_from_a_list_still_scores() {
        let lists = vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "a".to_string()],
        ];
        let fused = reciprocal_rank_fusion(&lists);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn empty_lists_yield_empty_fusion() {
        let lists: Vec<Vec<String>> = vec![vec![], vec![]];
        assert!(reciprocal_rank_fusion(&lists).is_empty());
    }
}
