//! Rubric & Scoring Module (§4.4): parses a reviewer's raw output into a
//! validated `PeerReview`, structured JSON first, falling back to a
//! line-anchored textual form. An invalid review becomes an abstention.

use super::types::{ParseOutcome, PeerReview, RubricScores, DISSENT_MAX_CHARS};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Deserialize)]
struct RawRanking {
    slot: usize,
    rank: u32,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    rankings: Vec<RawRanking>,
    #[serde(default)]
    scores: HashMap<String, RubricScores>,
    #[serde(default)]
    dissent: Option<String>,
    #[serde(default)]
    pass_vote: Option<bool>,
}

/// Parses one reviewer's raw model output. `reviewer_slot` is excluded from
/// `candidate_slots` by the caller (the orchestrator never asks a reviewer
/// to rank itself).
pub fn parse_peer_review(raw: &str, reviewer_slot: usize, candidate_slots: &[usize]) -> ParseOutcome {
    let expected: HashSet<usize> = candidate_slots.iter().copied().filter(|s| *s != reviewer_slot).collect();

    let parsed = parse_structured(raw).or_else(|| parse_line_anchored(raw));

    let Some(mut review) = parsed else {
        return ParseOutcome::Abstain("no recognizable structured or line-anchored output".to_string());
    };

    // Strip any self-ranking rather than rejecting outright; a reviewer
    // ranking itself is dropped, not counted (§ Glossary Self-vote).
    review.rankings.retain(|(slot, _)| *slot != reviewer_slot);
    review.rubric_scores.remove(&reviewer_slot);

    let got: HashSet<usize> = review.rankings.iter().map(|(slot, _)| *slot).collect();
    if got != expected {
        return ParseOutcome::Abstain(format!(
            "ranking is not a permutation of non-self candidates: expected {:?}, got {:?}",
            sorted(&expected),
            sorted(&got)
        ));
    }
    let mut ranks: Vec<u32> = review.rankings.iter().map(|(_, r)| *r).collect();
    ranks.sort_unstable();
    let expected_ranks: Vec<u32> = (1..=ranks.len() as u32).collect();
    if ranks != expected_ranks {
        return ParseOutcome::Abstain(format!(
            "ranking values are not a 1..N permutation: got {:?}",
            ranks
        ));
    }

    for scores in review.rubric_scores.values_mut() {
        scores.clamp();
    }
    if let Some(d) = review.dissent.as_mut() {
        if d.len() > DISSENT_MAX_CHARS {
            // `String::truncate` panics if the cut lands mid-character, so
            // walk back to the nearest char boundary at or before the cap.
            let mut cut = DISSENT_MAX_CHARS;
            while cut > 0 && !d.is_char_boundary(cut) {
                cut -= 1;
            }
            d.truncate(cut);
        }
    }
    review.reviewer_slot = reviewer_slot;

    ParseOutcome::Review(review)
}

fn sorted(set: &HashSet<usize>) -> Vec<usize> {
    let mut v: Vec<usize> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

fn parse_structured(raw: &str) -> Option<PeerReview> {
    let trimmed = find_json_object(raw)?;
    let parsed: RawReview = serde_json::from_str(trimmed).ok()?;
    Some(from_raw(parsed))
}

/// Reviewer output is not guaranteed to be *only* JSON — models often wrap
/// it in prose or a fenced code block. Take the first balanced `{...}`
/// span, same tolerance the line-anchored fallback exists to cover.
fn find_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn from_raw(raw: RawReview) -> PeerReview {
    let rankings = raw.rankings.into_iter().map(|r| (r.slot, r.rank)).collect();
    let rubric_scores = raw
        .scores
        .into_iter()
        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|slot| (slot, v)))
        .collect();
    PeerReview {
        reviewer_slot: 0, // filled in by caller context; orchestrator tracks this separately
        rankings,
        rubric_scores,
        dissent: raw.dissent,
        pass_vote: raw.pass_vote,
    }
}

/// Line-anchored textual fallback, structurally the same idea as the
/// `ISSUE:`/`DESCRIPTION:`/`CONFIDENCE:` block format reviewers fall back to
/// elsewhere in this family: a fixed set of recognized line prefixes, parsed
/// independent of surrounding prose.
///
/// Recognized prefixes:
/// ```text
/// RANK: slot=<n> rank=<n>
/// SCORE: slot=<n> accuracy=<f> completeness=<f> clarity=<f> conciseness=<f> relevance=<f>
/// DISSENT: <free text, continues until next recognized prefix>
/// PASS: true|false
/// ```
fn parse_line_anchored(raw: &str) -> Option<PeerReview> {
    let mut rankings = Vec::new();
    let mut rubric_scores = HashMap::new();
    let mut dissent: Option<String> = None;
    let mut pass_vote = None;
    let mut found_any = false;

    let lines: Vec<&str> = raw.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if let Some(rest) = line.strip_prefix("RANK:") {
            if let Some((slot, rank)) = parse_rank_line(rest) {
                rankings.push((slot, rank));
                found_any = true;
            }
        } else if let Some(rest) = line.strip_prefix("SCORE:") {
            if let Some((slot, scores)) = parse_score_line(rest) {
                rubric_scores.insert(slot, scores);
                found_any = true;
            }
        } else if let Some(rest) = line.strip_prefix("PASS:") {
            let v = rest.trim().eq_ignore_ascii_case("true");
            pass_vote = Some(v);
            found_any = true;
        } else if let Some(rest) = line.strip_prefix("DISSENT:") {
            let mut text = rest.trim().to_string();
            let mut j = i + 1;
            while j < lines.len() && !is_recognized_prefix(lines[j].trim()) {
                text.push('\n');
                text.push_str(lines[j]);
                j += 1;
            }
            dissent = Some(text.trim().to_string());
            found_any = true;
            i = j;
            continue;
        }
        i += 1;
    }

    if !found_any {
        return None;
    }

    Some(PeerReview {
        reviewer_slot: 0,
        rankings,
        rubric_scores,
        dissent,
        pass_vote,
    })
}

fn is_recognized_prefix(line: &str) -> bool {
    line.starts_with("RANK:") || line.starts_with("SCORE:") || line.starts_with("PASS:") || line.starts_with("DISSENT:")
}

fn parse_rank_line(rest: &str) -> Option<(usize, u32)> {
    let mut slot = None;
    let mut rank = None;
    for token in rest.split_whitespace() {
        if let Some(v) = token.strip_prefix("slot=") {
            slot = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("rank=") {
            rank = v.parse().ok();
        }
    }
    Some((slot?, rank?))
}

fn parse_score_line(rest: &str) -> Option<(usize, RubricScores)> {
    let mut slot = None;
    let mut scores = RubricScores::default();
    for token in rest.split_whitespace() {
        if let Some(v) = token.strip_prefix("slot=") {
            slot = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("accuracy=") {
            scores.accuracy = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("completeness=") {
            scores.completeness = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("clarity=") {
            scores.clarity = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("conciseness=") {
            scores.conciseness = v.parse().ok();
        } else if let Some(v) = token.strip_prefix("relevance=") {
            scores.relevance = v.parse().ok();
        }
    }
    Some((slot?, scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_structured_json() {
        let raw = r#"{"rankings":[{"slot":1,"rank":1},{"slot":2,"rank":2}],"scores":{"1":{"accuracy":9.5}},"pass_vote":true}"#;
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        match outcome {
            ParseOutcome::Review(r) => {
                assert_eq!(r.rank_of(1), Some(1));
                assert_eq!(r.rank_of(2), Some(2));
                assert_eq!(r.pass_vote, Some(true));
            }
            ParseOutcome::Abstain(reason) => panic!("unexpected abstain: {reason}"),
        }
    }

    #[test]
    fn strips_self_vote_rather_than_rejecting() {
        let raw = r#"{"rankings":[{"slot":0,"rank":1},{"slot":1,"rank":2},{"slot":2,"rank":3}]}"#;
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        match outcome {
            ParseOutcome::Review(r) => {
                assert!(r.rank_of(0).is_none());
                assert_eq!(r.rankings.len(), 2);
            }
            ParseOutcome::Abstain(reason) => panic!("unexpected abstain: {reason}"),
        }
    }

    #[test]
    fn rejects_incomplete_ranking() {
        let raw = r#"{"rankings":[{"slot":1,"rank":1}]}"#;
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        assert!(matches!(outcome, ParseOutcome::Abstain(_)));
    }

    #[test]
    fn rejects_duplicate_ranks() {
        let raw = r#"{"rankings":[{"slot":1,"rank":1},{"slot":2,"rank":1}]}"#;
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        assert!(matches!(outcome, ParseOutcome::Abstain(_)));
    }

    #[test]
    fn falls_back_to_line_anchored_form() {
        let raw = "Here is my review.\nRANK: slot=1 rank=1\nRANK: slot=2 rank=2\nSCORE: slot=1 accuracy=8 clarity=7\nDISSENT: I disagree with the framing\nof candidate 2.\nPASS: false\n";
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        match outcome {
            ParseOutcome::Review(r) => {
                assert_eq!(r.rank_of(1), Some(1));
                assert_eq!(r.pass_vote, Some(false));
                assert!(r.dissent.unwrap().contains("disagree"));
                assert_eq!(r.rubric_scores[&1].accuracy, Some(8.0));
            }
            ParseOutcome::Abstain(reason) => panic!("unexpected abstain: {reason}"),
        }
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let raw = r#"{"rankings":[{"slot":1,"rank":1},{"slot":2,"rank":2}],"scores":{"1":{"accuracy":15.0,"clarity":-3.0}}}"#;
        let outcome = parse_peer_review(raw, 0, &[0, 1, 2]);
        match outcome {
            ParseOutcome::Review(r) => {
                assert_eq!(r.rubric_scores[&1].accuracy, Some(10.0));
                assert_eq!(r.rubric_scores[&1].clarity, Some(0.0));
            }
            ParseOutcome::Abstain(reason) => panic!("unexpected abstain: {reason}"),
        }
    }

    #[test]
    fn unrecognizable_output_abstains() {
        let outcome = parse_peer_review("I refuse to answer in any known format.", 0, &[0, 1, 2]);
        assert!(matches!(outcome, ParseOutcome::Abstain(_)));
    }

    /// A dissent whose `DISSENT_MAX_CHARS`-th byte lands inside a multi-byte
    /// character must not panic on truncation.
    #[test]
    fn truncates_dissent_on_a_char_boundary() {
        let long_dissent = "a".repeat(DISSENT_MAX_CHARS - 1) + "漢" + &"b".repeat(100);
        let raw = serde_json::json!({
            "rankings": [{"slot": 1, "rank": 1}, {"slot": 2, "rank": 2}],
            "dissent": long_dissent,
        })
        .to_string();
        let outcome = parse_peer_review(&raw, 0, &[0, 1, 2]);
        match outcome {
            ParseOutcome::Review(r) => {
                let dissent = r.dissent.expect("dissent should survive truncation");
                assert!(dissent.len() <= DISSENT_MAX_CHARS);
                assert!(dissent.is_char_boundary(dissent.len()));
            }
            ParseOutcome::Abstain(reason) => panic!("unexpected abstain: {reason}"),
        }
    }
}
