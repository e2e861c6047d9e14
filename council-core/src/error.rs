//! Error types for council-core.

use thiserror::Error;

/// Result type alias using council-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the deliberation pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is missing or self-contradictory. Surfaced at startup; fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A retried upstream failure the gateway could not recover from.
    #[error("transient upstream error calling {model_id}: {message}")]
    Transient { model_id: String, message: String },

    /// A model's circuit breaker tripped after persistent failures; the
    /// session continues without it if enough panelists remain.
    #[error("model {model_id} circuit-broken after persistent failures")]
    ModelPersistentFailure { model_id: String },

    /// A model's circuit breaker is currently open; calls are shorted.
    #[error("circuit open for model {model_id}")]
    CircuitOpen { model_id: String },

    /// Tier Selector could not find two viable candidates for the panel.
    #[error("insufficient panel: fewer than two viable candidates")]
    InsufficientPanel,

    /// Fewer than two Stage 1 slots survived to form the Stage 2 panel.
    #[error("insufficient stage1 survivors")]
    InsufficientStage1Survivors,

    /// Fewer than two valid Stage 2 reviews remained for aggregation.
    #[error("insufficient stage2 reviewers")]
    InsufficientStage2Reviewers,

    /// A reviewer's output could not be parsed into a `PeerReview`.
    #[error("parse error: {0}")]
    Parse(String),

    /// The session was cancelled by its caller before sealing.
    #[error("session cancelled")]
    Cancelled,

    /// The session deadline elapsed before sealing.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport failure (webhook delivery, dynamic registry fetch).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Bias-auditor or transcript storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O failure writing the transcript.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, tagged with a short description.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transient upstream error.
    pub fn transient(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a model-persistent-failure error.
    pub fn model_persistent_failure(model_id: impl Into<String>) -> Self {
        Self::ModelPersistentFailure {
            model_id: model_id.into(),
        }
    }

    /// Create a circuit-open error.
    pub fn circuit_open(model_id: impl Into<String>) -> Self {
        Self::CircuitOpen {
            model_id: model_id.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error belongs to a category the gateway's retry layer
    /// will retry (network errors, unclassified transport failures, 5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.status().map(|s| s.is_server_error()).unwrap_or(true)
            }
            _ => false,
        }
    }
}
