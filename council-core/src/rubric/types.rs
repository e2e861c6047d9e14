//! `PeerReview` and rubric score types (§3, §4.4).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum length retained for a reviewer's dissent text.
pub const DISSENT_MAX_CHARS: usize = 4096;

/// Numeric rubric dimensions, each in `[0, 10]`. Missing dimensions are
/// `None`, never coerced to zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RubricScores {
    pub accuracy: Option<f64>,
    pub completeness: Option<f64>,
    pub clarity: Option<f64>,
    pub conciseness: Option<f64>,
    pub relevance: Option<f64>,
}

impl RubricScores {
    pub fn clamp(&mut self) {
        let clamp_one = |v: &mut Option<f64>| {
            if let Some(x) = v {
                *x = x.clamp(0.0, 10.0);
            }
        };
        clamp_one(&mut self.accuracy);
        clamp_one(&mut self.completeness);
        clamp_one(&mut self.clarity);
        clamp_one(&mut self.conciseness);
        clamp_one(&mut self.relevance);
    }

    pub fn mean_accuracy(&self) -> Option<f64> {
        self.accuracy
    }
}

/// A single participant's Stage 2 output, already validated (§3 PeerReview).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReview {
    pub reviewer_slot: usize,
    /// `(candidate_slot, rank)` pairs; a permutation over the non-self
    /// candidate set, rank 1 = best.
    pub rankings: Vec<(usize, u32)>,
    pub rubric_scores: HashMap<usize, RubricScores>,
    pub dissent: Option<String>,
    /// Present only when the query's `verdict_type` is `binary`.
    pub pass_vote: Option<bool>,
}

impl PeerReview {
    pub fn rank_of(&self, candidate_slot: usize) -> Option<u32> {
        self.rankings
            .iter()
            .find(|(slot, _)| *slot == candidate_slot)
            .map(|(_, rank)| *rank)
    }
}

/// Outcome of parsing one reviewer's raw output (§4.4, §9 "explicit result
/// variants" instead of exception-based control flow).
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Review(PeerReview),
    Abstain(String),
}
