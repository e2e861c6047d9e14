//! `AggregateResult` and the binary verdict (§3, §4.5).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryVerdict {
    Pass,
    Fail,
    Unclear,
}

/// Output of the Aggregator for one session (§3 AggregateResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Candidate slot indices, best first.
    pub ordering: Vec<usize>,
    pub scores: HashMap<usize, f64>,
    /// Number of non-self reviews each candidate received.
    pub vote_counts: HashMap<usize, u32>,
    pub tie_break_applied: bool,
    pub bias_correction_applied: bool,
    /// In [0, 1].
    pub confidence: f64,
    pub method: String,
    pub verdict: Option<BinaryVerdict>,
    pub verdict_confidence: Option<f64>,
}
