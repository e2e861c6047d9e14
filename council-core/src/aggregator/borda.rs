//! Normalized Borda Count with self-vote exclusion (§4.5).

use crate::rubric::PeerReview;
use std::collections::HashMap;

/// Computes `S_c` for every candidate. `panel_size` is `M` in the spec's
/// notation (the number of candidates presented to Stage 2, including
/// each reviewer's own response). `weights` lets the bias-correction pass
/// (§4.5, §4.6) down-weight flagged reviewers without duplicating this
/// function; a reviewer absent from `weights` counts at weight 1.0.
///
/// For `M >= 3`: `s_{r,c} = (M - 1 - rank) / (M - 2)`, so first = 1.0, last
/// = 0.0. For `M == 2` a reviewer only ever ranks the single other
/// candidate at rank 1 (there is no discriminating information in the
/// ranking itself), so that entry scores 1.0.
pub fn compute_borda_scores(
    panel_size: usize,
    reviews: &[PeerReview],
    weights: &HashMap<usize, f64>,
) -> (HashMap<usize, f64>, HashMap<usize, u32>) {
    let mut weighted_sums: HashMap<usize, f64> = HashMap::new();
    let mut weight_totals: HashMap<usize, f64> = HashMap::new();
    let mut counts: HashMap<usize, u32> = HashMap::new();

    for review in reviews {
        let weight = *weights.get(&review.reviewer_slot).unwrap_or(&1.0);
        for (candidate, rank) in &review.rankings {
            let s = score_for_rank(panel_size, *rank);
            *weighted_sums.entry(*candidate).or_insert(0.0) += s * weight;
            *weight_totals.entry(*candidate).or_insert(0.0) += weight;
            *counts.entry(*candidate).or_insert(0) += 1;
        }
    }

    let mut means = HashMap::new();
    for (candidate, sum) in &weighted_sums {
        let total_weight = weight_totals[candidate].max(f64::EPSILON);
        means.insert(*candidate, sum / total_weight);
    }

    (means, counts)
}

fn score_for_rank(panel_size: usize, rank: u32) -> f64 {
    if panel_size <= 2 {
        1.0
    } else {
        let m = panel_size as f64;
        (m - 1.0 - rank as f64) / (m - 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(reviewer: usize, rankings: Vec<(usize, u32)>) -> PeerReview {
        PeerReview {
            reviewer_slot: reviewer,
            rankings,
            rubric_scores: Default::default(),
            dissent: None,
            pass_vote: None,
        }
    }

    #[test]
    fn first_place_scores_one_last_place_scores_zero() {
        let reviews = vec![review(0, vec![(1, 1), (2, 2), (3, 3)])];
        let (scores, _) = compute_borda_scores(4, &reviews, &HashMap::new());
        assert_eq!(scores[&1], 1.0);
        assert_eq!(scores[&3], 0.0);
    }

    #[test]
    fn two_panel_awards_full_score() {
        let reviews = vec![review(0, vec![(1, 1)]), review(1, vec![(0, 1)])];
        let (scores, _) = compute_borda_scores(2, &reviews, &HashMap::new());
        assert_eq!(scores[&1], 1.0);
        assert_eq!(scores[&0], 1.0);
    }

    #[test]
    fn averages_across_multiple_reviewers() {
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2)]),
            review(2, vec![(1, 2), (0, 1)]),
        ];
        let (scores, counts) = compute_borda_scores(3, &reviews, &HashMap::new());
        // candidate 1: reviewer0 gives rank1 -> 1.0; reviewer2 gives rank2 -> 0.0; mean 0.5
        assert_eq!(scores[&1], 0.5);
        assert_eq!(counts[&1], 2);
    }

    #[test]
    fn down_weighted_reviewer_counts_less() {
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2)]),
            review(2, vec![(1, 2), (0, 1)]),
        ];
        let weights = HashMap::from([(2usize, 0.5)]);
        let (unweighted, _) = compute_borda_scores(3, &reviews, &HashMap::new());
        let (weighted, _) = compute_borda_scores(3, &reviews, &weights);
        // reviewer 2's vote for candidate 1 (score 0.0) now counts for less,
        // pulling candidate 1's mean up relative to the unweighted case.
        assert!(weighted[&1] > unweighted[&1]);
    }
}
