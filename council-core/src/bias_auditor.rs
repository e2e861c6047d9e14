//! Bias Auditor (§4.6): per-session signal detection plus a cross-session
//! EWMA store of each reviewer's deviation from consensus.

use crate::aggregator::BIAS_DEVIATION_THRESHOLD;
use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// EWMA smoothing factor for the cross-session deviation tracker.
const EWMA_ALPHA: f64 = 0.3;
/// Spearman correlation threshold above which two reviewers are flagged co-biased (§4.6 (ii)).
const CO_BIAS_CORRELATION_THRESHOLD: f64 = 0.9;
/// Minimum cross-session sample count before co-bias is considered established.
const CO_BIAS_MIN_SESSIONS: i64 = 5;

/// One reviewer's ranking output from a single session, keyed by a durable
/// model identity (not the ephemeral per-session slot index) so cross-session
/// aggregation tracks the same reviewer across queries.
#[derive(Debug, Clone)]
pub struct ReviewerSample {
    pub reviewer_id: String,
    pub deviation_from_consensus: f64,
    /// Awarded rank for each candidate, ordered by presentation position —
    /// used for positional-bias and co-bias detection.
    pub ranking_by_position: Vec<u32>,
}

/// Signals the orchestrator can log or surface as degradation notices.
#[derive(Debug, Clone, Default)]
pub struct SessionBiasReport {
    pub co_bias_pairs: Vec<(String, String, f64)>,
}

/// Cross-session bias tracker, backed by a small embedded SQLite table
/// (`reviewer_id`, `ewma_deviation`, `sample_count`, `last_updated`); the
/// reference implementation of the external append-only sink in §9.
pub struct BiasAuditor {
    conn: Arc<Mutex<Connection>>,
}

impl BiasAuditor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reviewer_bias (
                reviewer_id TEXT PRIMARY KEY,
                ewma_deviation REAL NOT NULL,
                sample_count INTEGER NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS co_bias_pairs (
                reviewer_a TEXT NOT NULL,
                reviewer_b TEXT NOT NULL,
                correlation_sum REAL NOT NULL,
                sample_count INTEGER NOT NULL,
                PRIMARY KEY (reviewer_a, reviewer_b)
            );",
        )?;
        Ok(())
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("failed to lock bias auditor connection: {e}")))?;
        f(&conn).map_err(Error::from)
    }

    /// Records one session's per-reviewer deviation samples, updating the
    /// cross-session EWMA (§4.6).
    pub fn record_session(&self, samples: &[ReviewerSample]) -> Result<()> {
        self.with_conn(|conn| {
            for sample in samples {
                let existing: Option<(f64, i64)> = conn
                    .query_row(
                        "SELECT ewma_deviation, sample_count FROM reviewer_bias WHERE reviewer_id = ?1",
                        params![sample.reviewer_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let (new_ewma, new_count) = match existing {
                    Some((prev_ewma, count)) => (
                        EWMA_ALPHA * sample.deviation_from_consensus + (1.0 - EWMA_ALPHA) * prev_ewma,
                        count + 1,
                    ),
                    None => (sample.deviation_from_consensus, 1),
                };

                conn.execute(
                    "INSERT INTO reviewer_bias (reviewer_id, ewma_deviation, sample_count, last_updated)
                     VALUES (?1, ?2, ?3, datetime('now'))
                     ON CONFLICT(reviewer_id) DO UPDATE SET
                        ewma_deviation = excluded.ewma_deviation,
                        sample_count = excluded.sample_count,
                        last_updated = excluded.last_updated",
                    params![sample.reviewer_id, new_ewma, new_count],
                )?;
            }
            Ok(())
        })
    }

    /// Reviewer ids whose cross-session EWMA deviation magnitude exceeds the
    /// threshold (§4.6); feeds the Aggregator's down-weight set.
    pub fn flagged_reviewers(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT reviewer_id FROM reviewer_bias WHERE ABS(ewma_deviation) > ?1")?;
            let ids = stmt
                .query_map(params![BIAS_DEVIATION_THRESHOLD], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(ids)
        })
    }

    pub fn deviation_for(&self, reviewer_id: &str) -> Result<Option<f64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT ewma_deviation FROM reviewer_bias WHERE reviewer_id = ?1",
                params![reviewer_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Updates the co-bias correlation tracker for every reviewer pair in
    /// this session (§4.6 (ii)); returns pairs whose running Spearman
    /// correlation now exceeds the threshold over enough sessions to be
    /// considered established.
    pub fn record_co_bias_session(&self, samples: &[ReviewerSample]) -> Result<SessionBiasReport> {
        let mut report = SessionBiasReport::default();
        self.with_conn(|conn| {
            for i in 0..samples.len() {
                for j in (i + 1)..samples.len() {
                    let a = &samples[i];
                    let b = &samples[j];
                    let Some(correlation) = spearman_correlation(&a.ranking_by_position, &b.ranking_by_position)
                    else {
                        continue;
                    };

                    let (key_a, key_b) = if a.reviewer_id <= b.reviewer_id {
                        (a.reviewer_id.clone(), b.reviewer_id.clone())
                    } else {
                        (b.reviewer_id.clone(), a.reviewer_id.clone())
                    };

                    let existing: Option<(f64, i64)> = conn
                        .query_row(
                            "SELECT correlation_sum, sample_count FROM co_bias_pairs
                             WHERE reviewer_a = ?1 AND reviewer_b = ?2",
                            params![key_a, key_b],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;

                    let (sum, count) = match existing {
                        Some((prev_sum, prev_count)) => (prev_sum + correlation, prev_count + 1),
                        None => (correlation, 1),
                    };

                    conn.execute(
                        "INSERT INTO co_bias_pairs (reviewer_a, reviewer_b, correlation_sum, sample_count)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(reviewer_a, reviewer_b) DO UPDATE SET
                            correlation_sum = excluded.correlation_sum,
                            sample_count = excluded.sample_count",
                        params![key_a, key_b, sum, count],
                    )?;

                    let mean_correlation = sum / count as f64;
                    if count >= CO_BIAS_MIN_SESSIONS && mean_correlation > CO_BIAS_CORRELATION_THRESHOLD {
                        report.co_bias_pairs.push((key_a, key_b, mean_correlation));
                    }
                }
            }
            Ok(())
        })?;
        Ok(report)
    }
}

/// Positional bias (§4.6 (iii)): correlates a reviewer's awarded rank with
/// the candidate's presentation position. Position randomization keeps this
/// near zero for an unbiased reviewer; a persistent positive correlation
/// indicates first-slot favoritism.
pub fn detect_positional_bias(ranking_by_position: &[u32]) -> f64 {
    let positions: Vec<u32> = (0..ranking_by_position.len() as u32).collect();
    spearman_correlation(&positions, ranking_by_position).unwrap_or(0.0)
}

fn spearman_correlation(a: &[u32], b: &[u32]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len() as f64;
    let rank_a = ranks_of(a);
    let rank_b = ranks_of(b);
    let d_squared_sum: f64 = rank_a.iter().zip(rank_b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    Some(1.0 - (6.0 * d_squared_sum) / (n * (n * n - 1.0)))
}

fn ranks_of(values: &[u32]) -> Vec<f64> {
    let mut indexed: Vec<(usize, u32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by_key(|(_, v)| *v);
    let mut ranks = vec![0.0; values.len()];
    for (rank, (original_index, _)) in indexed.into_iter().enumerate() {
        ranks[original_index] = rank as f64 + 1.0;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, deviation: f64) -> ReviewerSample {
        ReviewerSample {
            reviewer_id: id.to_string(),
            deviation_from_consensus: deviation,
            ranking_by_position: vec![1, 2, 3],
        }
    }

    #[test]
    fn ewma_accumulates_across_sessions() {
        let auditor = BiasAuditor::in_memory().unwrap();
        auditor.record_session(&[sample("model-a", 0.4)]).unwrap();
        auditor.record_session(&[sample("model-a", 0.4)]).unwrap();
        let deviation = auditor.deviation_for("model-a").unwrap().unwrap();
        assert!(deviation > 0.0);
    }

    #[test]
    fn flags_reviewer_past_threshold() {
        let auditor = BiasAuditor::in_memory().unwrap();
        for _ in 0..5 {
            auditor.record_session(&[sample("model-a", 0.5)]).unwrap();
        }
        let flagged = auditor.flagged_reviewers().unwrap();
        assert!(flagged.contains("model-a"));
    }

    #[test]
    fn unbiased_reviewer_not_flagged() {
        let auditor = BiasAuditor::in_memory().unwrap();
        auditor.record_session(&[sample("model-b", 0.01)]).unwrap();
        let flagged = auditor.flagged_reviewers().unwrap();
        assert!(!flagged.contains("model-b"));
    }

    #[test]
    fn perfect_first_slot_bias_has_correlation_one() {
        // rank assigned equals position exactly: always prefers earlier slots.
        let correlation = detect_positional_bias(&[1, 2, 3, 4]);
        assert!((correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn co_bias_detected_after_min_sessions_of_identical_rankings() {
        let auditor = BiasAuditor::in_memory().unwrap();
        let mut last = SessionBiasReport::default();
        for _ in 0..CO_BIAS_MIN_SESSIONS {
            let samples = vec![sample("model-a", 0.0), sample("model-b", 0.0)];
            last = auditor.record_co_bias_session(&samples).unwrap();
        }
        assert!(!last.co_bias_pairs.is_empty());
    }
}
