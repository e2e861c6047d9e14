//! `Backend`: the injected transport capability behind the Gateway.
//!
//! The actual wire format (HTTP call to a hosted provider, or a local
//! inference process) is out of scope per §1 — "we assume a capability
//! that, given a model identifier and a prompt, returns tokens". This
//! module defines that capability's shape plus an in-memory mock used by
//! this crate's own tests and available to downstream integrators wiring
//! up end-to-end scenarios.

use crate::domain::{DegradationNotice, TokenUsage};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Options accompanying a single completion call.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub deadline: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            max_tokens: 4096,
            temperature: 0.7,
            json_mode: false,
        }
    }
}

/// Outcome of one completion call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub token_usage: TokenUsage,
    pub degradation_notices: Vec<DegradationNotice>,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
    pub terminal: bool,
}

/// Narrow transport capability the Gateway wraps with resilience (§4.3).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(
        &self,
        model_id: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult>;

    /// Native streaming support. Default implementation reports none; the
    /// Gateway synthesizes a single-chunk stream from `complete` in that
    /// case, per §4.3's "the gateway synthesizes a single-chunk stream".
    async fn complete_stream(
        &self,
        model_id: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Vec<StreamChunk>> {
        let result = self.complete(model_id, prompt, options).await?;
        Ok(vec![StreamChunk {
            delta: result.content,
            terminal: true,
        }])
    }
}

/// In-memory backend for tests: returns a scripted response per model id,
/// or a transient error when the model is in the configured failure set.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct MockBackend {
        responses: HashMap<String, String>,
        /// model_id -> number of times it should fail before succeeding.
        fail_until: HashMap<String, usize>,
        calls: Mutex<HashMap<String, AtomicUsize>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                responses: HashMap::new(),
                fail_until: HashMap::new(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        pub fn with_response(mut self, model_id: impl Into<String>, content: impl Into<String>) -> Self {
            self.responses.insert(model_id.into(), content.into());
            self
        }

        pub fn failing_n_times(mut self, model_id: impl Into<String>, n: usize) -> Self {
            self.fail_until.insert(model_id.into(), n);
            self
        }

        pub fn call_count(&self, model_id: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .get(model_id)
                .map(|c| c.load(Ordering::SeqCst))
                .unwrap_or(0)
        }
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn complete(
            &self,
            model_id: &str,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<CompletionResult> {
            let count = {
                let mut calls = self.calls.lock().unwrap();
                let counter = calls.entry(model_id.to_string()).or_insert_with(|| AtomicUsize::new(0));
                let prev = counter.fetch_add(1, Ordering::SeqCst);
                prev
            };

            if let Some(threshold) = self.fail_until.get(model_id) {
                if count < *threshold {
                    return Err(crate::error::Error::transient(model_id, "mock transient failure"));
                }
            }

            let content = self
                .responses
                .get(model_id)
                .cloned()
                .unwrap_or_else(|| format!("mock response to: {}", prompt));

            Ok(CompletionResult {
                content,
                token_usage: TokenUsage {
                    input_tokens: prompt.len() as u64 / 4,
                    output_tokens: 64,
                },
                degradation_notices: Vec::new(),
            })
        }
    }
}
