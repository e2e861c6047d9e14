//! `ModelDescriptor`: per-model metadata used by the Tier Selector (§3, §4.1).

use crate::config::Tier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Availability status reported by a registry provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Degraded,
    Unavailable,
}

/// Hardware profile for a locally-hosted model; `None` for remote models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub requires_gpu: bool,
    pub min_vram_gb: Option<u32>,
}

/// Per-token pricing, expressed per million tokens to keep the numbers
/// readable at typical rates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    pub input_cost_per_m: f64,
    pub output_cost_per_m: f64,
}

impl Pricing {
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_m
            + (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_m
    }
}

/// Static or dynamically-fetched attributes for one model (§3
/// ModelDescriptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub provider: String,
    pub tier: Tier,
    pub context_window: u32,
    pub pricing: Pricing,
    /// In [0, 1].
    pub quality_score: f64,
    pub capabilities: HashSet<String>,
    pub hardware_profile: Option<HardwareProfile>,
    pub availability: Availability,
}

impl ModelDescriptor {
    pub fn has_capabilities(&self, required: &HashSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn is_viable(&self) -> bool {
        self.availability != Availability::Unavailable
    }
}
