//! Deterministic tie-break (§4.5): applied identically to Borda and
//! Schulze output so repeated aggregation over identical inputs always
//! yields the same ordering (P4).

use std::cmp::Ordering;
use std::collections::HashMap;

const SCORE_EPSILON: f64 = 1e-9;

/// Per-candidate inputs the tie-break rules read, beyond the aggregate score.
#[derive(Debug, Clone, Default)]
pub struct TieBreakContext {
    pub mean_accuracy: HashMap<usize, f64>,
    pub total_cost_usd: HashMap<usize, f64>,
    pub content_hash: HashMap<usize, String>,
}

/// Orders candidates best-first by `scores`, breaking ties by (1) higher
/// mean rubric accuracy, (2) lower total generation cost, (3) lexicographic
/// content hash. Returns the ordering and whether any tie-break rule beyond
/// raw score was actually needed.
pub fn order_with_tie_break(
    candidates: &[usize],
    scores: &HashMap<usize, f64>,
    ctx: &TieBreakContext,
) -> (Vec<usize>, bool) {
    let mut ordered: Vec<usize> = candidates.to_vec();
    let mut tie_break_applied = false;

    ordered.sort_by(|a, b| {
        let sa = *scores.get(a).unwrap_or(&0.0);
        let sb = *scores.get(b).unwrap_or(&0.0);
        if (sa - sb).abs() > SCORE_EPSILON {
            return sb.partial_cmp(&sa).unwrap_or(Ordering::Equal);
        }

        let aa = *ctx.mean_accuracy.get(a).unwrap_or(&0.0);
        let ab = *ctx.mean_accuracy.get(b).unwrap_or(&0.0);
        if (aa - ab).abs() > SCORE_EPSILON {
            tie_break_applied = true;
            return ab.partial_cmp(&aa).unwrap_or(Ordering::Equal);
        }

        let ca = *ctx.total_cost_usd.get(a).unwrap_or(&f64::MAX);
        let cb = *ctx.total_cost_usd.get(b).unwrap_or(&f64::MAX);
        if (ca - cb).abs() > SCORE_EPSILON {
            tie_break_applied = true;
            return ca.partial_cmp(&cb).unwrap_or(Ordering::Equal);
        }

        let ha = ctx.content_hash.get(a).map(|s| s.as_str()).unwrap_or("");
        let hb = ctx.content_hash.get(b).map(|s| s.as_str()).unwrap_or("");
        if ha != hb {
            tie_break_applied = true;
        }
        ha.cmp(hb)
    });

    (ordered, tie_break_applied)
}
