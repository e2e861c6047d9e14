//! Webhook delivery (§6): HMAC-SHA256 signed POST of each `LayerEvent`,
//! with exponential backoff retry.

use crate::error::{Error, Result};
use crate::events::{EventKind, LayerEvent};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
    /// Event kinds to deliver; `None` delivers every kind (§6 "if `events`
    /// omitted, all event kinds are delivered").
    pub events: Option<Vec<EventKind>>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: String::new(),
            events: None,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
        }
    }
}

/// Delivers a session's `LayerEvent`s, one per POST, to a single configured endpoint.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Whether `kind` is in scope for this endpoint's subscription.
    pub fn wants(&self, kind: EventKind) -> bool {
        match &self.config.events {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    /// Posts one event, retrying on transport error or non-2xx response.
    /// Final exhaustion is logged internally rather than dispatched as an
    /// event — a `webhook.delivery.failed` event would itself need
    /// delivery to the same unreachable endpoint.
    pub async fn deliver(&self, event: &LayerEvent) -> Result<()> {
        let body = serde_json::to_vec(event)?;
        let signature = format!("sha256={}", sign(&self.config.secret, &body));

        for attempt in 0..self.config.max_attempts {
            let outcome = self
                .client
                .post(&self.config.url)
                .header("X-Council-Signature", signature.clone())
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    warn!(status = %response.status(), attempt, url = %self.config.url, "webhook delivery rejected");
                }
                Err(err) => {
                    warn!(error = %err, attempt, url = %self.config.url, "webhook delivery failed");
                }
            }

            if attempt + 1 < self.config.max_attempts {
                tokio::time::sleep(self.delay_for_attempt(attempt)).await;
            }
        }

        warn!(
            url = %self.config.url,
            kind = %event.kind,
            attempts = self.config.max_attempts,
            "webhook delivery exhausted retries"
        );
        Err(Error::internal(format!("webhook delivery to {} exhausted retries", self.config.url)))
    }

    /// Exponential backoff with full jitter, capped at `max_delay_ms` (§6
    /// "exponential backoff 1s → 32s, jitter").
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt as i32);
        let max = (self.config.base_delay_ms as f64 * exp).min(self.config.max_delay_ms as f64);
        Duration::from_millis(jitter(max) as u64)
    }
}

/// Full jitter: uniform random delay in `[0, max]`, seeded from the clock
/// rather than a `rand` dependency (same approach as `gateway::retry`).
fn jitter(max: f64) -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let fraction = (nanos % 1_000) as f64 / 1_000.0;
    max * fraction
}

/// Computes the hex-encoded HMAC-SHA256 signature of `body` under `secret`,
/// sent as the `X-Council-Signature` header.
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}
