//! Core session-scoped data model: `Query`, `PanelSlot`, `StageOneResponse`,
//! and `DeliberationResult` (§3).

use crate::aggregator::AggregateResult;
use crate::config::{Mode, Tier, VerdictType};
use crate::events::LayerEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a deliberation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable description of a single deliberation request (§3 Query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub prompt: String,
    pub mode: Mode,
    pub verdict_type: VerdictType,
    pub rubric_focus: Option<String>,
    /// When set, the orchestrator rejects prompt material not declared in
    /// `snapshot_id` and omits prior conversation turns from participant
    /// prompts.
    pub context_isolation: bool,
    /// Opaque identifier pinning the input material this query is allowed
    /// to reference under context isolation.
    pub snapshot_id: Option<String>,
    pub tier: Tier,
    pub required_capabilities: HashSet<String>,
    pub deadline_ms: Option<u64>,
}

impl Query {
    pub fn new(prompt: impl Into<String>, mode: Mode, verdict_type: VerdictType, tier: Tier) -> Self {
        Self {
            id: QueryId::new(),
            prompt: prompt.into(),
            mode,
            verdict_type,
            rubric_focus: None,
            context_isolation: false,
            snapshot_id: None,
            tier,
            required_capabilities: HashSet::new(),
            deadline_ms: None,
        }
    }
}

/// Role a panel slot plays within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    Chairman,
}

/// A position in the panel, bound to a concrete model. Immutable once the
/// Tier Selector assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSlot {
    pub index: usize,
    pub model_id: String,
    pub role: Role,
}

/// Terminal status of a Stage 1 attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Ok,
    Failed,
    Timeout,
    Cancelled,
}

/// A human-readable, machine-tagged note that a stage completed with
/// reduced guarantees (§ Glossary: Degradation notice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationNotice {
    pub code: String,
    pub message: String,
}

impl DegradationNotice {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Token accounting for one completion call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One participant's Stage 1 output (§3 StageOneResponse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOneResponse {
    pub slot_index: usize,
    pub content: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub degradation_notices: Vec<DegradationNotice>,
    pub status: TerminalStatus,
}

impl StageOneResponse {
    pub fn is_ok(&self) -> bool {
        self.status == TerminalStatus::Ok
    }
}

/// The final structured or free-form outcome of a session (§3
/// DeliberationResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationResult {
    pub query_id: QueryId,
    pub synthesis: String,
    pub winning_slot: Option<usize>,
    pub aggregate: Option<AggregateResult>,
    pub stage1: Vec<StageOneResponse>,
    pub events: Vec<LayerEvent>,
    pub started_at: DateTime<Utc>,
    pub stage1_completed_at: Option<DateTime<Utc>>,
    pub stage2_completed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub degradation_notices: Vec<DegradationNotice>,
    pub transcript_path: Option<String>,
}

/// Exit codes for CLI / gate invocations (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Pass = 0,
    Fail = 1,
    UnclearOrLowConfidence = 2,
    InsufficientPanel = 3,
    SystemError = 4,
}

impl DeliberationResult {
    /// Pure mapping from a completed result to the process exit code it
    /// should produce for a CLI/gate caller.
    pub fn exit_code(&self) -> ExitCode {
        match &self.aggregate {
            Some(agg) => {
                if agg.confidence < 0.5 {
                    return ExitCode::UnclearOrLowConfidence;
                }
                match agg.verdict {
                    Some(crate::aggregator::BinaryVerdict::Pass) => ExitCode::Pass,
                    Some(crate::aggregator::BinaryVerdict::Fail) => ExitCode::Fail,
                    Some(crate::aggregator::BinaryVerdict::Unclear) => ExitCode::UnclearOrLowConfidence,
                    None => ExitCode::Pass,
                }
            }
            None => ExitCode::SystemError,
        }
    }
}
