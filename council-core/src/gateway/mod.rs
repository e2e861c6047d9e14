//! Gateway Abstraction (§4.3): a uniform completion capability with
//! timeout/retry/circuit-breaking and degradation notices layered around
//! an injected `Backend`.

pub mod backend;
pub mod circuit_breaker;
pub mod retry;

pub use backend::{Backend, CompletionOptions, CompletionResult, StreamChunk};
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryConfig;

use crate::domain::DegradationNotice;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resilience envelope around a `Backend`: timeout, retry, circuit
/// breaking, degradation notices.
pub struct Gateway {
    backend: Arc<dyn Backend>,
    circuit_breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl Gateway {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = CircuitBreaker::new(config);
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn circuit_state(&self, model_id: &str) -> CircuitState {
        self.circuit_breaker.state(model_id)
    }

    /// Runs the full resilience envelope for one completion: circuit check,
    /// bounded retries with backoff, per-attempt deadline.
    pub async fn complete(
        &self,
        model_id: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult> {
        match self.circuit_breaker.admit(model_id) {
            Admission::Deny => return Err(Error::circuit_open(model_id)),
            Admission::Allow | Admission::AllowAsProbe => {}
        }

        let mut last_err = None;
        let mut notices: Vec<DegradationNotice> = Vec::new();

        for attempt in 0..=self.retry.max_retries {
            let attempt_result = tokio::time::timeout(
                options.deadline,
                self.backend.complete(model_id, prompt, options),
            )
            .await;

            match attempt_result {
                Ok(Ok(mut result)) => {
                    self.circuit_breaker.record(model_id, true);
                    result.degradation_notices.splice(0..0, notices);
                    debug!(model_id, attempt, "gateway call succeeded");
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    let retryable = e.is_retryable() && attempt < self.retry.max_retries;
                    if retryable {
                        notices.push(DegradationNotice::new(
                            "retry",
                            format!("attempt {} failed for {}: {}", attempt + 1, model_id, e),
                        ));
                        last_err = Some(e);
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    self.circuit_breaker.record(model_id, false);
                    warn!(model_id, attempt, error = %e, "gateway call failed, not retrying");
                    return Err(e);
                }
                Err(_timeout_elapsed) => {
                    let retryable = attempt < self.retry.max_retries;
                    if retryable {
                        notices.push(DegradationNotice::new(
                            "retry",
                            format!("attempt {} timed out for {}", attempt + 1, model_id),
                        ));
                        last_err = Some(Error::transient(model_id, "deadline exceeded"));
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    self.circuit_breaker.record(model_id, false);
                    return Err(Error::DeadlineExceeded);
                }
            }
        }

        self.circuit_breaker.record(model_id, false);
        if matches!(self.circuit_breaker.state(model_id), CircuitState::Open) {
            info!(model_id, "circuit tripped open after persistent failures");
            return Err(Error::model_persistent_failure(model_id));
        }
        Err(last_err.unwrap_or_else(|| Error::internal("gateway exhausted retries")))
    }

    /// Streaming variant. If the circuit is open the call is shorted
    /// exactly as in `complete`; otherwise delegates to the backend's
    /// native streaming (or its single-chunk synthesis).
    pub async fn complete_stream(
        &self,
        model_id: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Vec<StreamChunk>> {
        match self.circuit_breaker.admit(model_id) {
            Admission::Deny => return Err(Error::circuit_open(model_id)),
            Admission::Allow | Admission::AllowAsProbe => {}
        }

        match tokio::time::timeout(options.deadline, self.backend.complete_stream(model_id, prompt, options)).await {
            Ok(Ok(chunks)) => {
                self.circuit_breaker.record(model_id, true);
                Ok(chunks)
            }
            Ok(Err(e)) => {
                self.circuit_breaker.record(model_id, false);
                Err(e)
            }
            Err(_) => {
                self.circuit_breaker.record(model_id, false);
                Err(Error::DeadlineExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backend::mock::MockBackend;

    #[tokio::test]
    async fn succeeds_immediately_when_backend_is_healthy() {
        let backend = Arc::new(MockBackend::new().with_response("m", "hello"));
        let gateway = Gateway::new(backend);
        let result = gateway.complete("m", "prompt", &CompletionOptions::default()).await.unwrap();
        assert_eq!(result.content, "hello");
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let backend = Arc::new(
            MockBackend::new()
                .with_response("m", "recovered")
                .failing_n_times("m", 2),
        );
        let gateway = Gateway::new(backend.clone()).with_retry_config(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            backoff_factor: 1.0,
            max_delay_ms: 5,
        });
        let result = gateway.complete("m", "prompt", &CompletionOptions::default()).await.unwrap();
        assert_eq!(result.content, "recovered");
        assert_eq!(backend.call_count("m"), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_eventually_trips_breaker() {
        let backend = Arc::new(MockBackend::new().failing_n_times("m", usize::MAX));
        let gateway = Gateway::new(backend)
            .with_retry_config(RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                backoff_factor: 1.0,
                max_delay_ms: 1,
            })
            .with_circuit_breaker_config(CircuitBreakerConfig {
                window_size: 5,
                window_duration: std::time::Duration::from_secs(60),
                failure_ratio_threshold: 0.5,
                min_samples: 2,
                cooldown: std::time::Duration::from_secs(30),
            });

        for _ in 0..3 {
            let _ = gateway.complete("m", "prompt", &CompletionOptions::default()).await;
        }
        assert_eq!(gateway.circuit_state("m"), CircuitState::Open);
        let err = gateway.complete("m", "prompt", &CompletionOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn synthesizes_single_chunk_stream_by_default() {
        let backend = Arc::new(MockBackend::new().with_response("m", "streamed"));
        let gateway = Gateway::new(backend);
        let chunks = gateway
            .complete_stream("m", "prompt", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].terminal);
        assert_eq!(chunks[0].delta, "streamed");
    }
}
