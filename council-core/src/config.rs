//! Session-level configuration surface.
//!
//! Loading these values from a file, environment, or secret store is out of
//! scope for this crate (the embedding application owns that); this module
//! only defines the typed surface and its documented defaults.

use serde::{Deserialize, Serialize};

/// Chairman behavior: consensus-seeking vs. adversarial debate framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Consensus,
    Debate,
    BinaryVerdict,
}

/// Shape of the final verdict the orchestrator must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictType {
    FreeForm,
    Binary,
    Rubric,
}

/// Peer-ranking aggregation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    Borda,
    Schulze,
}

/// Coarse quality band used by the Tier Selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Quick,
    Standard,
    High,
    Frontier,
}

/// Session-scoped configuration surface (§6).
///
/// Every field has a documented default; an embedder typically constructs
/// this from its own config file and overrides only what a particular
/// caller needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub mode: Mode,
    pub verdict_type: VerdictType,
    pub ranking_method: RankingMethod,
    pub exclude_self_votes: bool,
    pub style_normalization: bool,
    /// Cap on reviewers assigned per candidate; `None` means unlimited.
    /// Recommended: `Some(3)` once panel size exceeds 5 (stratified sampling
    /// keeps Stage 2 sub-quadratic).
    pub max_reviewers: Option<u32>,
    pub position_randomization: bool,
    /// If true, the Model Registry uses only the static provider and the
    /// Tier Selector prefers local-model slots.
    pub offline: bool,
    /// Toggles the dynamic metadata provider's periodic refetch.
    pub model_intelligence_enabled: bool,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Consensus,
            verdict_type: VerdictType::FreeForm,
            ranking_method: RankingMethod::Borda,
            exclude_self_votes: true,
            style_normalization: false,
            max_reviewers: None,
            position_randomization: true,
            offline: false,
            model_intelligence_enabled: true,
        }
    }
}
