//! Deliberation Orchestrator (§4.7): the state machine that drives
//! SELECTING_PANEL → STAGE1_RUNNING → [STAGE1_5_NORMALIZING?] →
//! STAGE2_RUNNING → AGGREGATING → STAGE3_RUNNING → SEALED, with FAILED
//! reachable from any stage.

pub mod prompts;

use crate::aggregator::{AggregationRequest, Aggregator, TieBreakContext};
use crate::bias_auditor::{BiasAuditor, ReviewerSample};
use crate::config::{CouncilConfig, VerdictType};
use crate::domain::{
    DegradationNotice, DeliberationResult, PanelSlot, Query, Role, StageOneResponse, TerminalStatus, TokenUsage,
};
use crate::error::{Error, Result};
use crate::events::{EventBus, EventEmitter, EventKind, LayerEvent};
use crate::gateway::{CompletionOptions, Gateway};
use crate::model::Registry;
use crate::rubric::{parse_peer_review, ParseOutcome, PeerReview};
use crate::tier_selector::{SelectionRequest, TierSelector};
use crate::transcript::TranscriptWriter;
use crate::webhook::WebhookDispatcher;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default total panel size (participants + chairman) when the embedder
/// doesn't override it via the builder.
pub const DEFAULT_PANEL_SIZE: usize = 5;
const DEFAULT_SESSION_DEADLINE_MS: u64 = 120_000;
const STAGE1_BUDGET_FRACTION: f64 = 0.60;
const STAGE2_BUDGET_FRACTION: f64 = 0.25;
const STAGE3_BUDGET_FRACTION: f64 = 0.15;

pub const REASON_INSUFFICIENT_PANEL: &str = "insufficient-panel";
pub const REASON_INSUFFICIENT_STAGE1: &str = "insufficient-stage1-survivors";
pub const REASON_INSUFFICIENT_STAGE2: &str = "insufficient-stage2-reviewers";

/// Builds a `CouncilOrchestrator` from its required collaborators plus
/// optional observability/persistence sinks.
pub struct CouncilOrchestratorBuilder {
    gateway: Arc<Gateway>,
    registry: Arc<dyn Registry>,
    bias_auditor: Option<Arc<BiasAuditor>>,
    transcript_root: Option<PathBuf>,
    webhook: Option<WebhookDispatcher>,
    config: CouncilConfig,
    event_bus_capacity: usize,
    panel_size: usize,
}

impl CouncilOrchestratorBuilder {
    pub fn new(gateway: Arc<Gateway>, registry: Arc<dyn Registry>) -> Self {
        Self {
            gateway,
            registry,
            bias_auditor: None,
            transcript_root: None,
            webhook: None,
            config: CouncilConfig::default(),
            event_bus_capacity: 1024,
            panel_size: DEFAULT_PANEL_SIZE,
        }
    }

    pub fn config(mut self, config: CouncilConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bias_auditor(mut self, auditor: Arc<BiasAuditor>) -> Self {
        self.bias_auditor = Some(auditor);
        self
    }

    pub fn transcript_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.transcript_root = Some(root.into());
        self
    }

    pub fn webhook(mut self, webhook: WebhookDispatcher) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity;
        self
    }

    /// Total slots including the chairman; must be at least 3 (>= 2
    /// participants + 1 chairman) per §4.7's panel-floor rule.
    pub fn panel_size(mut self, size: usize) -> Self {
        self.panel_size = size;
        self
    }

    pub fn build(self) -> CouncilOrchestrator {
        CouncilOrchestrator {
            gateway: self.gateway,
            tier_selector: TierSelector::new(Arc::clone(&self.registry)),
            registry: self.registry,
            bias_auditor: self.bias_auditor,
            event_bus: Arc::new(EventBus::new(self.event_bus_capacity)),
            transcript_root: self.transcript_root,
            webhook: self.webhook,
            config: self.config,
            panel_size: self.panel_size.max(3),
        }
    }
}

pub struct CouncilOrchestrator {
    gateway: Arc<Gateway>,
    registry: Arc<dyn Registry>,
    tier_selector: TierSelector,
    bias_auditor: Option<Arc<BiasAuditor>>,
    event_bus: Arc<EventBus>,
    transcript_root: Option<PathBuf>,
    webhook: Option<WebhookDispatcher>,
    config: CouncilConfig,
    panel_size: usize,
}

impl CouncilOrchestrator {
    pub fn builder(gateway: Arc<Gateway>, registry: Arc<dyn Registry>) -> CouncilOrchestratorBuilder {
        CouncilOrchestratorBuilder::new(gateway, registry)
    }

    /// Live event feed; independent of the transcript, per §5's "event bus
    /// semantics".
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Runs one deliberation session end to end (§4.7).
    pub async fn run(&self, query: Query) -> Result<DeliberationResult> {
        if query.context_isolation && query.snapshot_id.is_none() {
            return Err(Error::config("context isolation requires a snapshot_id"));
        }

        let started_at = Utc::now();
        let emitter = EventEmitter::new(query.id.to_string());
        let mut events: Vec<LayerEvent> = Vec::new();
        let mut degradation_notices: Vec<DegradationNotice> = Vec::new();

        let transcript = match &self.transcript_root {
            Some(root) => Some(TranscriptWriter::create(root, query.id)?),
            None => None,
        };
        if let Some(t) = &transcript {
            t.write_request(&query)?;
        }

        self.publish(&emitter, transcript.as_ref(), &mut events, EventKind::CouncilStarted, None, None).await;

        let total_deadline = Duration::from_millis(query.deadline_ms.unwrap_or(DEFAULT_SESSION_DEADLINE_MS));
        let stage1_deadline = total_deadline.mul_f64(STAGE1_BUDGET_FRACTION);
        let stage2_deadline = total_deadline.mul_f64(STAGE2_BUDGET_FRACTION);
        let stage3_deadline = total_deadline.mul_f64(STAGE3_BUDGET_FRACTION);

        // --- SELECTING_PANEL ---
        let panel = match self.select_panel(&query).await {
            Ok(panel) => panel,
            Err(_) => {
                self.publish_failure(&emitter, transcript.as_ref(), &mut events, REASON_INSUFFICIENT_PANEL).await;
                return Err(Error::InsufficientPanel);
            }
        };
        let chairman = panel.iter().find(|s| s.role == Role::Chairman).expect("panel always has a chairman").clone();
        let participants: Vec<PanelSlot> = panel.iter().filter(|s| s.role == Role::Participant).cloned().collect();

        // --- STAGE1_RUNNING ---
        let stage1_prompt = prompts::stage1_prompt(&query);
        let stage1_options = CompletionOptions {
            deadline: stage1_deadline,
            ..CompletionOptions::default()
        };
        for slot in &participants {
            self.publish(
                &emitter,
                transcript.as_ref(),
                &mut events,
                EventKind::Stage1SlotStarted,
                Some("stage1"),
                Some(slot.index),
            ).await;
        }
        let stage1_calls = participants.iter().map(|slot| {
            let gateway = Arc::clone(&self.gateway);
            let model_id = slot.model_id.clone();
            let prompt = stage1_prompt.clone();
            let options = stage1_options.clone();
            let slot_index = slot.index;
            async move {
                let start = Instant::now();
                let result = gateway.complete(&model_id, &prompt, &options).await;
                (slot_index, start.elapsed(), result)
            }
        });
        let stage1_raw = futures::future::join_all(stage1_calls).await;

        let mut stage1_responses: Vec<StageOneResponse> = Vec::new();
        for (slot_index, elapsed, result) in stage1_raw {
            let response = match result {
                Ok(completion) => {
                    degradation_notices.extend(completion.degradation_notices.iter().cloned());
                    StageOneResponse {
                        slot_index,
                        content: completion.content,
                        token_usage: completion.token_usage,
                        latency_ms: elapsed.as_millis() as u64,
                        degradation_notices: completion.degradation_notices,
                        status: TerminalStatus::Ok,
                    }
                }
                Err(Error::DeadlineExceeded) => StageOneResponse {
                    slot_index,
                    content: String::new(),
                    token_usage: TokenUsage::default(),
                    latency_ms: elapsed.as_millis() as u64,
                    degradation_notices: vec![DegradationNotice::new(
                        "stage1-timeout",
                        format!("slot {slot_index} exceeded its stage deadline"),
                    )],
                    status: TerminalStatus::Timeout,
                },
                Err(e) => {
                    warn!(slot = slot_index, error = %e, "stage1 slot failed");
                    StageOneResponse {
                        slot_index,
                        content: String::new(),
                        token_usage: TokenUsage::default(),
                        latency_ms: elapsed.as_millis() as u64,
                        degradation_notices: vec![DegradationNotice::new("stage1-failure", e.to_string())],
                        status: TerminalStatus::Failed,
                    }
                }
            };
            self.publish(
                &emitter,
                transcript.as_ref(),
                &mut events,
                EventKind::Stage1SlotCompleted,
                Some("stage1"),
                Some(slot_index),
            ).await;
            stage1_responses.push(response);
        }
        stage1_responses.sort_by_key(|r| r.slot_index);
        self.publish(&emitter, transcript.as_ref(), &mut events, EventKind::Stage1Complete, Some("stage1"), None).await;
        if let Some(t) = &transcript {
            t.write_stage1(&stage1_responses)?;
        }

        let mut survivors: Vec<StageOneResponse> = stage1_responses.into_iter().filter(|r| r.is_ok()).collect();
        if survivors.len() < 2 {
            self.publish_failure(&emitter, transcript.as_ref(), &mut events, REASON_INSUFFICIENT_STAGE1).await;
            return Err(Error::InsufficientStage1Survivors);
        }
        let stage1_completed_at = Utc::now();

        // --- STAGE1_5_NORMALIZING (optional) ---
        if self.config.style_normalization {
            self.normalize_style(&participants, &mut survivors, &stage1_options).await;
        }

        // --- STAGE2_RUNNING ---
        let candidate_slots: Vec<usize> = survivors.iter().map(|r| r.slot_index).collect();
        let reviewer_pool: Vec<&StageOneResponse> = match self.config.max_reviewers {
            Some(cap) if (cap as usize) < survivors.len() => survivors.iter().take(cap as usize).collect(),
            _ => survivors.iter().collect(),
        };

        let stage2_options = CompletionOptions {
            deadline: stage2_deadline,
            ..CompletionOptions::default()
        };
        let binary_verdict = self.config.verdict_type == VerdictType::Binary;

        for response in &reviewer_pool {
            self.publish(
                &emitter,
                transcript.as_ref(),
                &mut events,
                EventKind::Stage2SlotStarted,
                Some("stage2"),
                Some(response.slot_index),
            ).await;
        }

        let stage2_calls = reviewer_pool.iter().map(|reviewer| {
            let reviewer_slot = reviewer.slot_index;
            let ordered = self.presentation_order(&query, reviewer_slot, &candidate_slots, &survivors);
            let prompt = prompts::stage2_prompt(&query, &ordered, binary_verdict);
            let positions: Vec<usize> = ordered.iter().map(|(_, slot, _)| *slot).collect();
            let model_id = panel
                .iter()
                .find(|s| s.index == reviewer_slot)
                .map(|s| s.model_id.clone())
                .expect("reviewer slot is in the panel");
            let gateway = Arc::clone(&self.gateway);
            let options = stage2_options.clone();
            async move {
                let result = gateway.complete(&model_id, &prompt, &options).await;
                (reviewer_slot, positions, result)
            }
        });
        let stage2_raw = futures::future::join_all(stage2_calls).await;

        let mut valid_reviews: Vec<PeerReview> = Vec::new();
        let mut review_positions: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut abstentions = 0usize;
        for (reviewer_slot, positions, result) in stage2_raw {
            self.publish(
                &emitter,
                transcript.as_ref(),
                &mut events,
                EventKind::Stage2SlotCompleted,
                Some("stage2"),
                Some(reviewer_slot),
            ).await;
            let raw = match result {
                Ok(completion) => completion.content,
                Err(e) => {
                    warn!(slot = reviewer_slot, error = %e, "stage2 reviewer call failed, counted as abstention");
                    abstentions += 1;
                    degradation_notices.push(DegradationNotice::new(
                        "stage2-abstain",
                        format!("reviewer {reviewer_slot} produced no output: {e}"),
                    ));
                    continue;
                }
            };
            match parse_peer_review(&raw, reviewer_slot, &candidate_slots) {
                ParseOutcome::Review(review) => {
                    review_positions.insert(reviewer_slot, positions);
                    valid_reviews.push(review);
                }
                ParseOutcome::Abstain(reason) => {
                    abstentions += 1;
                    degradation_notices.push(DegradationNotice::new("stage2-abstain", reason));
                }
            }
        }
        self.publish(&emitter, transcript.as_ref(), &mut events, EventKind::Stage2Complete, Some("stage2"), None).await;
        if let Some(t) = &transcript {
            t.write_stage2(&valid_reviews)?;
        }

        if valid_reviews.len() < 2 {
            self.publish_failure(&emitter, transcript.as_ref(), &mut events, REASON_INSUFFICIENT_STAGE2).await;
            return Err(Error::InsufficientStage2Reviewers);
        }
        let stage2_completed_at = Utc::now();

        // --- AGGREGATING ---
        let pre_flagged_reviewers = self.pre_flagged_reviewers(&panel, &valid_reviews).await;
        let tie_break_ctx = self.tie_break_context(&candidate_slots, &survivors, &panel, &valid_reviews).await;
        let aggregate = Aggregator::aggregate(AggregationRequest {
            candidate_slots: &candidate_slots,
            panel_size: survivors.len(),
            reviews: &valid_reviews,
            method: self.config.ranking_method,
            pre_flagged_reviewers,
            tie_break_ctx,
            verdict_type: self.config.verdict_type,
            abstentions,
        })?;

        if let Some(auditor) = &self.bias_auditor {
            self.record_bias_signals(auditor, &panel, &valid_reviews, &review_positions, &aggregate).await;
        }

        // --- STAGE3_RUNNING ---
        let ordered_by_rank: Vec<(usize, &StageOneResponse)> = aggregate
            .ordering
            .iter()
            .filter_map(|slot| survivors.iter().find(|r| r.slot_index == *slot).map(|r| (*slot, r)))
            .collect();
        let dissents: Vec<String> = valid_reviews.iter().filter_map(|r| r.dissent.clone()).collect();
        let stage3_prompt = prompts::stage3_prompt(&query, &ordered_by_rank, aggregate.confidence, &dissents);
        let stage3_options = CompletionOptions {
            deadline: stage3_deadline,
            ..CompletionOptions::default()
        };
        self.publish(&emitter, transcript.as_ref(), &mut events, EventKind::Stage3Started, Some("stage3"), Some(chairman.index)).await;
        let chunks = self.gateway.complete_stream(&chairman.model_id, &stage3_prompt, &stage3_options).await?;
        for _ in &chunks {
            self.publish(
                &emitter,
                transcript.as_ref(),
                &mut events,
                EventKind::Stage3Token,
                Some("stage3"),
                Some(chairman.index),
            ).await;
        }
        let synthesis: String = chunks.into_iter().map(|c| c.delta).collect();
        self.publish(&emitter, transcript.as_ref(), &mut events, EventKind::Stage3Complete, Some("stage3"), Some(chairman.index)).await;
        if let Some(t) = &transcript {
            t.write_stage3(&synthesis)?;
        }

        let completed_at = Utc::now();
        let winning_slot = aggregate.ordering.first().copied();
        let low_confidence = aggregate.confidence < 0.5;

        let mut completed_event = emitter.emit(EventKind::CouncilCompleted, None, None);
        if low_confidence {
            completed_event = completed_event.with_metadata("low_confidence", true);
        }
        self.dispatch(transcript.as_ref(), &mut events, completed_event).await;

        let result = DeliberationResult {
            query_id: query.id,
            synthesis,
            winning_slot,
            aggregate: Some(aggregate),
            stage1: survivors,
            events,
            started_at,
            stage1_completed_at: Some(stage1_completed_at),
            stage2_completed_at: Some(stage2_completed_at),
            completed_at: Some(completed_at),
            degradation_notices,
            transcript_path: transcript.as_ref().map(|t| t.path().display().to_string()),
        };

        if let Some(t) = &transcript {
            t.seal(&result)?;
        }

        info!(query_id = %result.query_id, winning_slot = ?result.winning_slot, "deliberation sealed");
        Ok(result)
    }

    async fn select_panel(&self, query: &Query) -> Result<Vec<PanelSlot>> {
        let request = SelectionRequest {
            tier: query.tier,
            required_count: self.panel_size,
            required_capabilities: query.required_capabilities.clone(),
            budget_ceiling: None,
        };
        let model_ids = self.tier_selector.select(&request).await?;
        if model_ids.len() < 3 {
            return Err(Error::InsufficientPanel);
        }
        let chairman_model = model_ids[0].clone();
        let participant_models = &model_ids[1..];

        let mut panel: Vec<PanelSlot> = participant_models
            .iter()
            .enumerate()
            .map(|(i, model_id)| PanelSlot {
                index: i,
                model_id: model_id.clone(),
                role: Role::Participant,
            })
            .collect();
        panel.push(PanelSlot {
            index: participant_models.len(),
            model_id: chairman_model,
            role: Role::Chairman,
        });
        Ok(panel)
    }

    async fn normalize_style(
        &self,
        participants: &[PanelSlot],
        survivors: &mut [StageOneResponse],
        options: &CompletionOptions,
    ) {
        let normalize_calls = survivors.iter().map(|response| {
            let model_id = participants
                .iter()
                .find(|s| s.index == response.slot_index)
                .map(|s| s.model_id.clone());
            let content = response.content.clone();
            let gateway = Arc::clone(&self.gateway);
            let options = options.clone();
            let slot_index = response.slot_index;
            async move {
                let Some(model_id) = model_id else { return (slot_index, None) };
                let prompt = format!(
                    "Rewrite the following text in a neutral, impersonal voice. \
                     Preserve every factual claim exactly; do not add or remove information.\n\n{content}"
                );
                match gateway.complete(&model_id, &prompt, &options).await {
                    Ok(completion) => (slot_index, Some(completion.content)),
                    Err(_) => (slot_index, None),
                }
            }
        });
        let normalized = futures::future::join_all(normalize_calls).await;
        for (slot_index, rewritten) in normalized {
            if let Some(content) = rewritten {
                if let Some(response) = survivors.iter_mut().find(|r| r.slot_index == slot_index) {
                    response.content = content;
                }
            }
        }
    }

    /// Builds one reviewer's candidate presentation order: all candidates
    /// except itself, shuffled with a fresh permutation seeded from the
    /// query and reviewer slot when position randomization is enabled.
    fn presentation_order<'a>(
        &self,
        query: &Query,
        reviewer_slot: usize,
        candidate_slots: &[usize],
        survivors: &'a [StageOneResponse],
    ) -> Vec<(char, usize, &'a StageOneResponse)> {
        let others: Vec<usize> = candidate_slots.iter().copied().filter(|s| *s != reviewer_slot).collect();
        let order = if self.config.position_randomization {
            let mut hasher = DefaultHasher::new();
            query.id.to_string().hash(&mut hasher);
            reviewer_slot.hash(&mut hasher);
            deterministic_shuffle(hasher.finish(), &others)
        } else {
            others
        };
        order
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                let label = (b'A' + (i % 26) as u8) as char;
                let response = survivors.iter().find(|r| r.slot_index == slot).expect("candidate slot present");
                (label, slot, response)
            })
            .collect()
    }

    async fn pre_flagged_reviewers(&self, panel: &[PanelSlot], reviews: &[PeerReview]) -> HashSet<usize> {
        let Some(auditor) = &self.bias_auditor else {
            return HashSet::new();
        };
        let flagged_ids = match auditor.flagged_reviewers() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "bias auditor lookup failed, proceeding without cross-session flags");
                return HashSet::new();
            }
        };
        reviews
            .iter()
            .filter_map(|r| {
                let model_id = panel.iter().find(|s| s.index == r.reviewer_slot).map(|s| s.model_id.clone())?;
                flagged_ids.contains(&model_id).then_some(r.reviewer_slot)
            })
            .collect()
    }

    async fn tie_break_context(
        &self,
        candidate_slots: &[usize],
        survivors: &[StageOneResponse],
        panel: &[PanelSlot],
        reviews: &[PeerReview],
    ) -> TieBreakContext {
        let mut mean_accuracy = HashMap::new();
        let mut total_cost_usd = HashMap::new();
        let mut content_hash = HashMap::new();

        for &slot in candidate_slots {
            let accuracies: Vec<f64> = reviews
                .iter()
                .filter_map(|r| r.rubric_scores.get(&slot).and_then(|s| s.accuracy))
                .collect();
            let avg = if accuracies.is_empty() {
                0.0
            } else {
                accuracies.iter().sum::<f64>() / accuracies.len() as f64
            };
            mean_accuracy.insert(slot, avg);

            if let Some(response) = survivors.iter().find(|r| r.slot_index == slot) {
                let model_id = panel.iter().find(|s| s.index == slot).map(|s| s.model_id.as_str());
                let mut cost = 0.0;
                if let Some(model_id) = model_id {
                    if let Some(descriptor) = self.registry.describe(model_id).await {
                        cost = descriptor
                            .pricing
                            .estimate_cost(response.token_usage.input_tokens, response.token_usage.output_tokens);
                    }
                }
                total_cost_usd.insert(slot, cost);

                let mut hasher = Sha256::new();
                hasher.update(response.content.as_bytes());
                content_hash.insert(slot, format!("{:x}", hasher.finalize()));
            }
        }

        TieBreakContext {
            mean_accuracy,
            total_cost_usd,
            content_hash,
        }
    }

    async fn record_bias_signals(
        &self,
        auditor: &BiasAuditor,
        panel: &[PanelSlot],
        reviews: &[PeerReview],
        review_positions: &HashMap<usize, Vec<usize>>,
        aggregate: &crate::aggregator::AggregateResult,
    ) {
        let final_rank_of = |slot: usize| aggregate.ordering.iter().position(|s| *s == slot);
        let panel_size = (aggregate.ordering.len().max(2) - 1) as f64;

        let samples: Vec<ReviewerSample> = reviews
            .iter()
            .filter_map(|review| {
                let reviewer_id = panel.iter().find(|s| s.index == review.reviewer_slot)?.model_id.clone();
                let positions = review_positions.get(&review.reviewer_slot)?;

                let mut deltas = Vec::new();
                for &slot in positions {
                    if let (Some(reviewer_rank), Some(final_rank)) = (review.rank_of(slot), final_rank_of(slot)) {
                        deltas.push((reviewer_rank as f64 - 1.0 - final_rank as f64) / panel_size);
                    }
                }
                let deviation_from_consensus = if deltas.is_empty() {
                    0.0
                } else {
                    deltas.iter().sum::<f64>() / deltas.len() as f64
                };

                let ranking_by_position: Vec<u32> =
                    positions.iter().map(|slot| review.rank_of(*slot).unwrap_or(u32::MAX)).collect();

                Some(ReviewerSample {
                    reviewer_id,
                    deviation_from_consensus,
                    ranking_by_position,
                })
            })
            .collect();

        if samples.is_empty() {
            return;
        }
        if let Err(e) = auditor.record_session(&samples) {
            warn!(error = %e, "failed to record cross-session bias samples");
        }
        match auditor.record_co_bias_session(&samples) {
            Ok(report) if !report.co_bias_pairs.is_empty() => {
                for (a, b, correlation) in &report.co_bias_pairs {
                    warn!(reviewer_a = %a, reviewer_b = %b, correlation, "co-bias threshold exceeded");
                }
            }
            Err(e) => warn!(error = %e, "failed to record co-bias session"),
            _ => {}
        }
    }

    async fn publish(
        &self,
        emitter: &EventEmitter,
        transcript: Option<&TranscriptWriter>,
        events: &mut Vec<LayerEvent>,
        kind: EventKind,
        stage: Option<&str>,
        slot: Option<usize>,
    ) -> LayerEvent {
        let event = emitter.emit(kind, stage, slot);
        self.dispatch(transcript, events, event.clone()).await;
        event
    }

    /// Builds and publishes a `council.failed` event tagged with `reason`
    /// (§4.7/§7 failure reasons), without a second emit-and-append round trip.
    async fn publish_failure(
        &self,
        emitter: &EventEmitter,
        transcript: Option<&TranscriptWriter>,
        events: &mut Vec<LayerEvent>,
        reason: &'static str,
    ) {
        let event = emitter.emit(EventKind::CouncilFailed, None, None).with_metadata("reason", reason);
        self.dispatch(transcript, events, event).await;
    }

    /// Publishes an already-built event to the live bus, the transcript, and
    /// this session's accumulated event list, then best-effort delivers it to
    /// the configured webhook (§6: one `LayerEvent` per POST, filtered by
    /// `events[]`). Shared by `publish` and `publish_failure` so metadata
    /// attached before dispatch is never lost.
    async fn dispatch(&self, transcript: Option<&TranscriptWriter>, events: &mut Vec<LayerEvent>, event: LayerEvent) {
        self.event_bus.publish(event.clone());
        if let Some(t) = transcript {
            let _ = t.append_event(&event);
        }
        if let Some(webhook) = &self.webhook {
            if webhook.wants(event.kind) {
                if let Err(e) = webhook.deliver(&event).await {
                    warn!(error = %e, kind = %event.kind, "webhook delivery failed after exhausting retries");
                }
            }
        }
        events.push(event);
    }
}

fn xorshift64(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

/// Deterministic Fisher-Yates shuffle seeded from `seed`. Avoids pulling in
/// a `rand` dependency for what only needs to be unpredictable across
/// reviewers, not cryptographically random (§4.6 position randomization).
fn deterministic_shuffle(seed: u64, items: &[usize]) -> Vec<usize> {
    let mut state = seed | 1;
    let mut v = items.to_vec();
    for i in (1..v.len()).rev() {
        state = xorshift64(state);
        let j = (state % (i as u64 + 1)) as usize;
        v.swap(i, j);
    }
    v
}
