//! # council-core
//!
//! A multi-model deliberation engine: orchestrates a panel of LLMs through
//! a three-stage protocol — parallel generation, anonymized peer review,
//! and chairman synthesis — with peer-ranking aggregation, cross-session
//! bias auditing, tiered model selection, and circuit-breaker resilience.
//!
//! ## Core Components
//!
//! - **Domain**: query/result types, panel slots, the deliberation exit codes
//! - **Tier Selector**: picks a panel from a `Registry` under tier/budget/capability constraints
//! - **Gateway**: the resilience envelope (timeout, retry, circuit breaking) around a `Backend`
//! - **Rubric**: parses Stage 2 peer reviews out of structured JSON or a line-anchored fallback
//! - **Aggregator**: Borda/Schulze ranking, bias down-weighting, tie-breaking, confidence
//! - **Bias Auditor**: a SQLite-backed ledger of per-reviewer deviation across sessions
//! - **Orchestrator**: drives the SELECTING_PANEL → ... → SEALED state machine
//! - **Events / Transcript / Webhook**: the observability and delivery fabric around a session
//!
//! ## Example
//!
//! ```rust,ignore
//! use council_core::{CouncilOrchestrator, Gateway, Query, StaticRegistry};
//! use std::sync::Arc;
//!
//! # async fn run(gateway: Arc<Gateway>, registry: Arc<StaticRegistry>) -> council_core::Result<()> {
//! let orchestrator = CouncilOrchestrator::builder(gateway, registry).build();
//! let query = Query::new(
//!     "does this patch fix the race?",
//!     council_core::Mode::Consensus,
//!     council_core::VerdictType::FreeForm,
//!     council_core::Tier::Standard,
//! );
//! let result = orchestrator.run(query).await?;
//! println!("{}", result.synthesis);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod bias_auditor;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod rubric;
pub mod tier_selector;
pub mod transcript;
pub mod webhook;

pub use aggregator::{AggregateResult, AggregationRequest, Aggregator, BinaryVerdict, TieBreakContext};
pub use bias_auditor::{BiasAuditor, ReviewerSample, SessionBiasReport};
pub use config::{CouncilConfig, Mode, RankingMethod, Tier, VerdictType};
pub use domain::{
    DegradationNotice, DeliberationResult, ExitCode, PanelSlot, Query, QueryId, Role,
    StageOneResponse, TerminalStatus, TokenUsage,
};
pub use error::{Error, Result};
pub use events::{EventBus, EventEmitter, EventKind, EventSubscription, LayerEvent};
pub use gateway::{Backend, CircuitBreaker, CircuitBreakerConfig, CompletionOptions, Gateway, RetryConfig};
pub use model::{Availability, ModelDescriptor, Pricing, Registry, StaticRegistry};
pub use orchestrator::{CouncilOrchestrator, CouncilOrchestratorBuilder};
pub use rubric::{parse_peer_review, ParseOutcome, PeerReview};
pub use tier_selector::{SelectionRequest, TierSelector};
pub use transcript::TranscriptWriter;
pub use webhook::{WebhookConfig, WebhookDispatcher};
