/// Reciprocal-rank fusion with a fixed constant of 60 (spec §4.4, GLOSSARY):
/// `score(d) = Σ over lists of 1 / (60 + rank(d in list))`, rank 1-based.
/// Takes ranked point-id lists (already filtered identically — see
/// `VectorStore::search`) and returns a single list sorted by fused score
/// descending, truncated to `k`.
pub const RRF_CONSTANT: f64 = 60.0;

pub fn fuse(lists: &[Vec<u64>], k: usize) -> Vec<(u64, f64)> {
    let mut scores: std::collections::HashMap<u64, f64> = std::collections::HashMap::new();
    let mut order: Vec<u64> = Vec::new();
    for list in lists {
        for (rank, point_id) in list.iter().enumerate() {
            let contribution = 1.0 / (RRF_CONSTANT + (rank + 1) as f64);
            if !scores.contains_key(point_id) {
                order.push(*point_id);
            }
            *scores.entry(*point_id).or_insert(0.0) += contribution;
        }
    }
    let mut fused: Vec<(u64, f64)> = order.into_iter().map(|id| (id, scores[&id])).collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(k);
    fused
}

/// Normalizes a raw RRF score (as returned by [`fuse`]) onto a 0-1 scale,
/// where 1.0 is the theoretical maximum: the same point ranked first in
/// every one of `num_lists` sub-queries. The raw formula tops out at
/// `num_lists / (RRF_CONSTANT + 1)` (≈0.033 for two lists), which is not a
/// usable domain for a user-facing `min_score` cutoff — callers compare the
/// normalized value against settings like `retrieval.min_score`.
pub fn normalize(raw_score: f64, num_lists: usize) -> f64 {
    if num_lists == 0 {
        return 0.0;
    }
    let max_possible = num_lists as f64 / (RRF_CONSTANT + 1.0);
    (raw_score / max_possible).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_present_in_both_lists_outranks_single_list_hit() {
        let dense = vec![1, 2, 3];
        let sparse = vec![2, 1, 4];
        let fused = fuse(&[dense, sparse], 10);
        assert_eq!(fused[0].0, 1);
    }

    #[test]
    fn truncates_to_k() {
        let dense = vec![1, 2, 3, 4, 5];
        let fused = fuse(&[dense], 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn top_of_a_single_list_scores_one_over_sixty_one() {
        let fused = fuse(&[vec![42]], 10);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_maps_top_rank_in_every_list_to_one() {
        let fused = fuse(&[vec![1, 2], vec![1, 3]], 10);
        let top = fused.iter().find(|(id, _)| *id == 1).unwrap();
        assert!((normalize(top.1, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_keeps_single_list_top_rank_reachable_against_default_min_score() {
        let fused = fuse(&[vec![42], vec![]], 10);
        let normalized = normalize(fused[0].1, 2);
        assert!(normalized >= 0.2, "normalized score {normalized} should clear the default min_score cutoff");
    }
}
