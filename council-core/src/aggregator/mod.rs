//! Aggregator (§4.5): converts a matrix of peer rankings/scores into a
//! final ordering and, optionally, a binary verdict.

pub mod borda;
pub mod schulze;
pub mod tie_break;
pub mod types;

pub use tie_break::TieBreakContext;
pub use types::{AggregateResult, BinaryVerdict};

use crate::config::RankingMethod;
use crate::config::VerdictType;
use crate::error::{Error, Result};
use crate::rubric::PeerReview;
use std::collections::{HashMap, HashSet};

/// Mean signed deviation (on Borda-scaled units) beyond which a reviewer is
/// down-weighted for this session's recompute pass (§4.5, §4.6).
pub const BIAS_DEVIATION_THRESHOLD: f64 = 0.25;
const DOWNWEIGHT_MULTIPLIER: f64 = 0.5;

pub struct AggregationRequest<'a> {
    pub candidate_slots: &'a [usize],
    pub panel_size: usize,
    pub reviews: &'a [PeerReview],
    pub method: RankingMethod,
    /// Reviewers already flagged by the cross-session bias auditor (§4.6);
    /// these are down-weighted unconditionally, in addition to whatever
    /// this session's own deviation pass finds.
    pub pre_flagged_reviewers: HashSet<usize>,
    pub tie_break_ctx: TieBreakContext,
    pub verdict_type: VerdictType,
    /// Reviewers expected to participate but whose output was rejected by
    /// the rubric parser (abstentions), for the binary-verdict majority math.
    pub abstentions: usize,
}

pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(req: AggregationRequest<'_>) -> Result<AggregateResult> {
        if req.reviews.len() < 2 {
            return Err(Error::InsufficientStage2Reviewers);
        }

        let no_weights = HashMap::new();
        let (initial_scores, vote_counts) = raw_scores(&req, &no_weights);

        let session_flagged = detect_deviating_reviewers(&req, &initial_scores);
        let mut flagged = req.pre_flagged_reviewers.clone();
        flagged.extend(session_flagged);

        let (scores, bias_correction_applied) = if flagged.is_empty() {
            (initial_scores, false)
        } else {
            let weights: HashMap<usize, f64> = flagged.iter().map(|r| (*r, DOWNWEIGHT_MULTIPLIER)).collect();
            let (recomputed, _) = raw_scores(&req, &weights);
            (recomputed, true)
        };

        let (ordering, tie_break_applied) =
            tie_break::order_with_tie_break(req.candidate_slots, &scores, &req.tie_break_ctx);

        let confidence = compute_confidence(&ordering, req.reviews, req.candidate_slots);

        let (verdict, verdict_confidence) = if req.verdict_type == VerdictType::Binary {
            let (v, c) = compute_binary_verdict(req.reviews, req.panel_size, req.abstentions);
            (Some(v), Some(c))
        } else {
            (None, None)
        };

        Ok(AggregateResult {
            ordering,
            scores,
            vote_counts,
            tie_break_applied,
            bias_correction_applied,
            confidence,
            method: method_name(&req),
            verdict,
            verdict_confidence,
        })
    }
}

fn method_name(req: &AggregationRequest<'_>) -> String {
    match effective_method(req) {
        RankingMethod::Borda => "borda".to_string(),
        RankingMethod::Schulze => "schulze".to_string(),
    }
}

/// Schulze is "preferred when panel size >= 5 and configured" (§4.5); a
/// session configured for Schulze with a smaller panel still uses Borda.
fn effective_method(req: &AggregationRequest<'_>) -> RankingMethod {
    match req.method {
        RankingMethod::Schulze if req.panel_size >= 5 => RankingMethod::Schulze,
        _ => RankingMethod::Borda,
    }
}

fn raw_scores(
    req: &AggregationRequest<'_>,
    weights: &HashMap<usize, f64>,
) -> (HashMap<usize, f64>, HashMap<usize, u32>) {
    match effective_method(req) {
        RankingMethod::Borda => borda::compute_borda_scores(req.panel_size, req.reviews, weights),
        RankingMethod::Schulze => {
            let scores = schulze::compute_schulze_scores(req.candidate_slots, req.reviews, weights);
            let (_, counts) = borda::compute_borda_scores(req.panel_size, req.reviews, weights);
            (scores, counts)
        }
    }
}

/// Per-session deviation pass (§4.5): reviewers whose rankings diverge
/// sharply and consistently from the pre-correction consensus get flagged
/// for this session's recompute, independent of cross-session history.
fn detect_deviating_reviewers(req: &AggregationRequest<'_>, consensus: &HashMap<usize, f64>) -> HashSet<usize> {
    let mut flagged = HashSet::new();
    for review in req.reviews {
        let mut deviations = Vec::new();
        for (candidate, rank) in &review.rankings {
            let reviewer_score = borda::compute_borda_scores(req.panel_size, std::slice::from_ref(review), &HashMap::new())
                .0
                .get(candidate)
                .copied()
                .unwrap_or(0.0);
            if let Some(consensus_score) = consensus.get(candidate) {
                deviations.push(reviewer_score - consensus_score);
            }
            let _ = rank;
        }
        if deviations.is_empty() {
            continue;
        }
        let mean_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;
        if mean_deviation.abs() > BIAS_DEVIATION_THRESHOLD {
            flagged.insert(review.reviewer_slot);
        }
    }
    flagged
}

/// `1 - normalized variance` of the individual per-reviewer scores
/// contributing to the top two candidates' aggregate — low disagreement
/// among reviewers about the top two yields high confidence; wide
/// disagreement yields low confidence. Variance is normalized against 0.25,
/// the maximum variance attainable by values confined to `[0, 1]`.
fn compute_confidence(ordering: &[usize], reviews: &[PeerReview], candidate_slots: &[usize]) -> f64 {
    if ordering.len() < 2 {
        return 1.0;
    }
    let panel_size = candidate_slots.len();
    let top_two = [ordering[0], ordering[1]];

    let mut values = Vec::new();
    for review in reviews {
        for (candidate, rank) in &review.rankings {
            if top_two.contains(candidate) {
                let s = if panel_size <= 2 {
                    1.0
                } else {
                    let m = panel_size as f64;
                    (m - 1.0 - *rank as f64) / (m - 2.0)
                };
                values.push(s);
            }
        }
    }
    if values.len() < 2 {
        return 1.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let normalized = (variance / 0.25).min(1.0);
    (1.0 - normalized).clamp(0.0, 1.0)
}

/// Binary verdict majority math (§4.5): strict majority among non-abstaining
/// reviewers, symmetric pass/fail, deadlocks resolve to `unclear`.
fn compute_binary_verdict(reviews: &[PeerReview], panel_size: usize, abstentions: usize) -> (BinaryVerdict, f64) {
    let valid_voters = panel_size.saturating_sub(abstentions);
    let majority_needed = valid_voters / 2 + 1;

    let pass_votes = reviews.iter().filter(|r| r.pass_vote == Some(true)).count();
    let fail_votes = reviews.iter().filter(|r| r.pass_vote == Some(false)).count();

    let verdict = if pass_votes >= majority_needed {
        BinaryVerdict::Pass
    } else if fail_votes >= majority_needed {
        BinaryVerdict::Fail
    } else {
        BinaryVerdict::Unclear
    };

    let margin = if valid_voters == 0 {
        0.0
    } else {
        (pass_votes as f64 - fail_votes as f64).abs() / valid_voters as f64
    };

    (verdict, margin.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::RubricScores;

    fn review(reviewer: usize, rankings: Vec<(usize, u32)>, pass_vote: Option<bool>) -> PeerReview {
        PeerReview {
            reviewer_slot: reviewer,
            rankings,
            rubric_scores: HashMap::new(),
            dissent: None,
            pass_vote,
        }
    }

    #[test]
    fn insufficient_reviewers_errors() {
        let reviews = vec![review(0, vec![(1, 1)], None)];
        let req = AggregationRequest {
            candidate_slots: &[0, 1],
            panel_size: 2,
            reviews: &reviews,
            method: RankingMethod::Borda,
            pre_flagged_reviewers: HashSet::new(),
            tie_break_ctx: TieBreakContext::default(),
            verdict_type: VerdictType::FreeForm,
            abstentions: 0,
        };
        assert!(matches!(Aggregator::aggregate(req), Err(Error::InsufficientStage2Reviewers)));
    }

    #[test]
    fn happy_path_four_reviewers_produces_unique_ordering() {
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2), (3, 3)], None),
            review(1, vec![(0, 2), (2, 1), (3, 3)], None),
            review(2, vec![(0, 2), (1, 1), (3, 3)], None),
            review(3, vec![(0, 2), (1, 1), (2, 3)], None),
        ];
        let req = AggregationRequest {
            candidate_slots: &[0, 1, 2, 3],
            panel_size: 4,
            reviews: &reviews,
            method: RankingMethod::Borda,
            pre_flagged_reviewers: HashSet::new(),
            tie_break_ctx: TieBreakContext::default(),
            verdict_type: VerdictType::FreeForm,
            abstentions: 0,
        };
        let result = Aggregator::aggregate(req).unwrap();
        assert_eq!(result.ordering.len(), 4);
        assert_eq!(result.method, "borda");
    }

    #[test]
    fn binary_verdict_majority_pass() {
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2)], Some(true)),
            review(1, vec![(0, 1), (2, 2)], Some(true)),
            review(2, vec![(0, 1), (1, 2)], Some(false)),
        ];
        let req = AggregationRequest {
            candidate_slots: &[0, 1, 2],
            panel_size: 3,
            reviews: &reviews,
            method: RankingMethod::Borda,
            pre_flagged_reviewers: HashSet::new(),
            tie_break_ctx: TieBreakContext::default(),
            verdict_type: VerdictType::Binary,
            abstentions: 0,
        };
        let result = Aggregator::aggregate(req).unwrap();
        assert_eq!(result.verdict, Some(BinaryVerdict::Pass));
    }

    #[test]
    fn binary_verdict_deadlock_is_unclear() {
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2), (3, 3)], Some(true)),
            review(1, vec![(0, 1), (2, 2), (3, 3)], Some(true)),
            review(2, vec![(0, 1), (1, 2), (3, 3)], Some(false)),
            review(3, vec![(0, 1), (1, 2), (2, 3)], Some(false)),
        ];
        let req = AggregationRequest {
            candidate_slots: &[0, 1, 2, 3],
            panel_size: 4,
            reviews: &reviews,
            method: RankingMethod::Borda,
            pre_flagged_reviewers: HashSet::new(),
            tie_break_ctx: TieBreakContext::default(),
            verdict_type: VerdictType::Binary,
            abstentions: 0,
        };
        let result = Aggregator::aggregate(req).unwrap();
        assert_eq!(result.verdict, Some(BinaryVerdict::Unclear));
    }

    #[test]
    fn bias_correction_flags_reviewer_with_systematic_deviation() {
        // Three reviewers agree closely; a fourth inverts the ranking entirely.
        let reviews = vec![
            review(0, vec![(1, 1), (2, 2), (3, 3)], None),
            review(1, vec![(0, 1), (2, 2), (3, 3)], None),
            review(2, vec![(0, 1), (1, 2), (3, 3)], None),
            review(3, vec![(0, 3), (1, 2), (2, 1)], None),
        ];
        let req = AggregationRequest {
            candidate_slots: &[0, 1, 2, 3],
            panel_size: 4,
            reviews: &reviews,
            method: RankingMethod::Borda,
            pre_flagged_reviewers: HashSet::new(),
            tie_break_ctx: TieBreakContext::default(),
            verdict_type: VerdictType::FreeForm,
            abstentions: 0,
        };
        let result = Aggregator::aggregate(req).unwrap();
        assert!(result.bias_correction_applied);
    }

    #[test]
    fn rubric_scores_not_confused_with_rankings() {
        let mut scores = HashMap::new();
        scores.insert(1usize, RubricScores { accuracy: Some(9.0), ..Default::default() });
        let _ = scores; // rubric scores feed tie-break context, not aggregation directly
    }
}
