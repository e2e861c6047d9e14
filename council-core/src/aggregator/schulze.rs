//! Schulze method: pairwise strongest-path ranking (§4.5), selectable
//! per-session, preferred when panel size >= 5 and configured.

use crate::rubric::PeerReview;
use std::collections::HashMap;

/// Returns, for each candidate, the number of pairwise "wins" (candidates
/// whose strongest path strength it beats) — higher is better, same
/// direction as Borda's `S_c` so downstream tie-break code is uniform.
/// `weights` applies the same bias-correction down-weighting Borda uses.
pub fn compute_schulze_scores(
    candidate_slots: &[usize],
    reviews: &[PeerReview],
    weights: &HashMap<usize, f64>,
) -> HashMap<usize, f64> {
    let n = candidate_slots.len();
    if n == 0 {
        return HashMap::new();
    }
    let index_of: HashMap<usize, usize> = candidate_slots.iter().enumerate().map(|(i, &s)| (s, i)).collect();

    // d[i][j] = weighted number of reviewers ranking i strictly better than j.
    let mut d = vec![vec![0.0f64; n]; n];
    for review in reviews {
        let weight = *weights.get(&review.reviewer_slot).unwrap_or(&1.0);
        for a in 0..candidate_slots.len() {
            for b in 0..candidate_slots.len() {
                if a == b {
                    continue;
                }
                let slot_a = candidate_slots[a];
                let slot_b = candidate_slots[b];
                if let (Some(rank_a), Some(rank_b)) = (review.rank_of(slot_a), review.rank_of(slot_b)) {
                    if rank_a < rank_b {
                        d[a][b] += weight;
                    }
                }
            }
        }
    }

    // Direct strengths: p[i][j] = d[i][j] if d[i][j] > d[j][i], else 0.
    let mut p = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if d[i][j] > d[j][i] {
                p[i][j] = d[i][j];
            }
        }
    }

    // Floyd-Warshall widest path.
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            for k in 0..n {
                if k == i || k == j {
                    continue;
                }
                p[j][k] = p[j][k].max(p[j][i].min(p[i][k]));
            }
        }
    }

    let mut wins: HashMap<usize, f64> = HashMap::new();
    for (slot, &i) in &index_of {
        let mut w = 0;
        for j in 0..n {
            if j != i && p[i][j] > p[j][i] {
                w += 1;
            }
        }
        wins.insert(*slot, w as f64);
    }
    wins
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
    fn clear_winner_beats_everyone() {
        let candidates = vec![0, 1, 2];
        let reviews = vec![
            review(3, vec![(0, 1), (1, 2), (2, 3)]),
            review(4, vec![(0, 1), (1, 2), (2, 3)]),
        ];
        let scores = compute_schulze_scores(&candidates, &reviews, &HashMap::new());
        assert_eq!(scores[&0], 2.0);
        assert_eq!(scores[&2], 0.0);
    }
}
