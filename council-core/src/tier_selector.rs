//! Tier Selector (§4.2): binds abstract panel slots to concrete model ids.

use crate::config::Tier;
use crate::error::{Error, Result};
use crate::model::{ModelDescriptor, Registry};
use std::collections::{HashSet, HashMap};
use std::sync::Arc;

/// Default scoring weights: quality, cost, diversity.
pub const DEFAULT_QUALITY_WEIGHT: f64 = 0.6;
pub const DEFAULT_COST_WEIGHT: f64 = 0.3;
pub const DEFAULT_DIVERSITY_WEIGHT: f64 = 0.1;

/// Inputs to a single selection call.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub tier: Tier,
    pub required_count: usize,
    pub required_capabilities: HashSet<String>,
    pub budget_ceiling: Option<f64>,
}

impl SelectionRequest {
    pub fn new(tier: Tier, required_count: usize) -> Self {
        Self {
            tier,
            required_count,
            required_capabilities: HashSet::new(),
            budget_ceiling: None,
        }
    }
}

/// Scored candidate retained for inspection/testing; not part of the
/// public selection result.
#[derive(Debug, Clone)]
struct ScoredCandidate {
    descriptor: ModelDescriptor,
    score: f64,
}

/// Assumes a representative call shape for cost estimation: 1K input tokens,
/// 512 output tokens. The exact shape doesn't matter for ranking purposes as
/// long as it's applied uniformly across candidates.
const COST_ESTIMATE_INPUT_TOKENS: u64 = 1_000;
const COST_ESTIMATE_OUTPUT_TOKENS: u64 = 512;

/// Given `(tier, requiredCount, requiredCapabilities, budgetCeiling?)`,
/// returns an ordered list of model identifiers honoring capability
/// requirements, budget, and a diversity preference (§4.2).
pub struct TierSelector {
    registry: Arc<dyn Registry>,
    quality_weight: f64,
    cost_weight: f64,
    diversity_weight: f64,
}

impl TierSelector {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            quality_weight: DEFAULT_QUALITY_WEIGHT,
            cost_weight: DEFAULT_COST_WEIGHT,
            diversity_weight: DEFAULT_DIVERSITY_WEIGHT,
        }
    }

    pub fn with_weights(mut self, quality: f64, cost: f64, diversity: f64) -> Self {
        self.quality_weight = quality;
        self.cost_weight = cost;
        self.diversity_weight = diversity;
        self
    }

    /// Runs the four-step algorithm from §4.2. Returns the ordered model ids
    /// (best first); if fewer than `required_count` survive filtering, all
    /// survivors are returned — the caller (orchestrator) decides whether a
    /// reduced panel (minimum 2) is acceptable.
    pub async fn select(&self, req: &SelectionRequest) -> Result<Vec<String>> {
        let all = self.registry.all().await;

        // Step 1 + 2: tier floor, capability and budget filtering.
        let mut candidates: Vec<ModelDescriptor> = all
            .into_iter()
            .filter(|d| d.tier >= req.tier)
            .filter(|d| d.is_viable())
            .filter(|d| d.has_capabilities(&req.required_capabilities))
            .filter(|d| match req.budget_ceiling {
                Some(ceiling) => {
                    d.pricing
                        .estimate_cost(COST_ESTIMATE_INPUT_TOKENS, COST_ESTIMATE_OUTPUT_TOKENS)
                        <= ceiling
                }
                None => true,
            })
            .collect();

        if candidates.is_empty() {
            return Err(Error::InsufficientPanel);
        }

        // Normalize cost across the filtered pool for step 3's scoring term.
        let max_cost = candidates
            .iter()
            .map(|d| d.pricing.estimate_cost(COST_ESTIMATE_INPUT_TOKENS, COST_ESTIMATE_OUTPUT_TOKENS))
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);

        // Step 3 + 4: greedy top-N selection, scoring recomputed per pick so
        // the diversity bonus reacts to what's already been chosen.
        candidates.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        let mut picked: Vec<ModelDescriptor> = Vec::new();
        let mut provider_counts: HashMap<String, u32> = HashMap::new();

        while picked.len() < req.required_count && !candidates.is_empty() {
            let mut best_idx = None;
            let mut best_score = f64::MIN;
            let mut best_cost = f64::MAX;

            for (idx, d) in candidates.iter().enumerate() {
                let cost = d.pricing.estimate_cost(COST_ESTIMATE_INPUT_TOKENS, COST_ESTIMATE_OUTPUT_TOKENS);
                let normalized_cost = cost / max_cost;
                let already_picked = *provider_counts.get(&d.provider).unwrap_or(&0);
                let diversity_bonus = if already_picked == 0 { 1.0 } else { 0.0 };

                let score = self.quality_weight * d.quality_score - self.cost_weight * normalized_cost
                    + self.diversity_weight * diversity_bonus;

                let better = score > best_score
                    || (score == best_score && cost < best_cost)
                    || (score == best_score
                        && cost == best_cost
                        && best_idx
                            .map(|b: usize| d.model_id < candidates[b].model_id)
                            .unwrap_or(false));

                if better {
                    best_score = score;
                    best_cost = cost;
                    best_idx = Some(idx);
                }
            }

            let idx = best_idx.expect("candidates is non-empty");
            let chosen = candidates.remove(idx);
            *provider_counts.entry(chosen.provider.clone()).or_insert(0) += 1;
            picked.push(chosen);
        }

        if picked.len() < 2 {
            return Err(Error::InsufficientPanel);
        }

        Ok(picked.into_iter().map(|d| d.model_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Availability, Pricing, StaticRegistry};
    use std::collections::HashSet;

    fn descriptor(id: &str, provider: &str, quality: f64, cost_per_m: f64) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.to_string(),
            provider: provider.to_string(),
            tier: Tier::Standard,
            context_window: 128_000,
            pricing: Pricing {
                input_cost_per_m: cost_per_m,
                output_cost_per_m: cost_per_m * 2.0,
            },
            quality_score: quality,
            capabilities: HashSet::new(),
            hardware_profile: None,
            availability: Availability::Available,
        }
    }

    #[tokio::test]
    async fn picks_top_n_by_score() {
        let registry = Arc::new(StaticRegistry::new(vec![
            descriptor("a", "anthropic", 0.9, 3.0),
            descriptor("b", "openai", 0.8, 1.0),
            descriptor("c", "anthropic", 0.95, 5.0),
        ]));
        let selector = TierSelector::new(registry);
        let req = SelectionRequest::new(Tier::Standard, 2);
        let chosen = selector.select(&req).await.unwrap();
        assert_eq!(chosen.len(), 2);
    }

    #[tokio::test]
    async fn insufficient_panel_errors() {
        let registry = Arc::new(StaticRegistry::new(vec![descriptor("a", "anthropic", 0.9, 3.0)]));
        let selector = TierSelector::new(registry);
        let req = SelectionRequest::new(Tier::Standard, 2);
        assert!(matches!(selector.select(&req).await, Err(Error::InsufficientPanel)));
    }

    #[tokio::test]
    async fn filters_by_tier_floor() {
        let mut quick = descriptor("quick-model", "p", 0.9, 1.0);
        quick.tier = Tier::Quick;
        let registry = Arc::new(StaticRegistry::new(vec![
            quick,
            descriptor("standard-model", "p2", 0.9, 1.0),
            descriptor("standard-model-2", "p3", 0.9, 1.0),
        ]));
        let selector = TierSelector::new(registry);
        let req = SelectionRequest::new(Tier::Standard, 3);
        let chosen = selector.select(&req).await.unwrap();
        assert!(!chosen.contains(&"quick-model".to_string()));
    }

    #[tokio::test]
    async fn respects_budget_ceiling() {
        let registry = Arc::new(StaticRegistry::new(vec![
            descriptor("cheap", "p", 0.7, 1.0),
            descriptor("expensive", "p2", 0.95, 1000.0),
        ]));
        let selector = TierSelector::new(registry);
        let mut req = SelectionRequest::new(Tier::Standard, 2);
        req.budget_ceiling = Some(0.01);
        // only "cheap" survives the ceiling -> insufficient panel (< 2)
        assert!(matches!(selector.select(&req).await, Err(Error::InsufficientPanel)));
    }
}
