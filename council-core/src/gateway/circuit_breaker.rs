//! Per-model circuit breaker (§4.3): `closed -> open -> half-open -> closed`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker configuration; defaults match §4.3.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub window_duration: Duration,
    pub failure_ratio_threshold: f64,
    pub min_samples: usize,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            window_duration: Duration::from_secs(60),
            failure_ratio_threshold: 0.5,
            min_samples: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct ModelState {
    state: CircuitState,
    results: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    /// true once a half-open probe has been dispatched and not yet resolved.
    probe_in_flight: bool,
}

impl ModelState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            results: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Tracks one breaker per model identifier. Reads/writes are guarded by a
/// per-model mutex rather than one global lock, since gateway calls fan out
/// across many models concurrently and this sits on the hot path.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    models: Mutex<HashMap<String, ModelState>>,
}

/// Decision returned before attempting a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// This call is the single half-open probe; its outcome decides whether
    /// the breaker closes again or re-opens.
    AllowAsProbe,
    Deny,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, model_id: &str) -> CircuitState {
        let mut models = self.models.lock().unwrap();
        let entry = models.entry(model_id.to_string()).or_insert_with(ModelState::new);
        self.refresh(entry)
    }

    /// Call before dispatching a gateway attempt.
    pub fn admit(&self, model_id: &str) -> Admission {
        let mut models = self.models.lock().unwrap();
        let entry = models.entry(model_id.to_string()).or_insert_with(ModelState::new);
        match self.refresh(entry) {
            CircuitState::Closed => Admission::Allow,
            CircuitState::Open => Admission::Deny,
            CircuitState::HalfOpen => {
                if entry.probe_in_flight {
                    Admission::Deny
                } else {
                    entry.probe_in_flight = true;
                    Admission::AllowAsProbe
                }
            }
        }
    }

    /// Record the outcome of an attempt admitted by `admit`.
    pub fn record(&self, model_id: &str, success: bool) {
        let mut models = self.models.lock().unwrap();
        let entry = models.entry(model_id.to_string()).or_insert_with(ModelState::new);

        if entry.state == CircuitState::HalfOpen {
            entry.probe_in_flight = false;
            if success {
                entry.state = CircuitState::Closed;
                entry.results.clear();
                entry.opened_at = None;
            } else {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
            }
            return;
        }

        let now = Instant::now();
        entry.results.push_back((now, success));
        while entry.results.len() > self.config.window_size {
            entry.results.pop_front();
        }
        while entry
            .results
            .front()
            .map(|(t, _)| now.duration_since(*t) > self.config.window_duration)
            .unwrap_or(false)
        {
            entry.results.pop_front();
        }

        if entry.state == CircuitState::Closed && entry.results.len() >= self.config.min_samples {
            let failures = entry.results.iter().filter(|(_, ok)| !ok).count();
            let ratio = failures as f64 / entry.results.len() as f64;
            if ratio > self.config.failure_ratio_threshold {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(now);
            }
        }
    }

    fn refresh(&self, entry: &mut ModelState) -> CircuitState {
        if entry.state == CircuitState::Open {
            if let Some(opened_at) = entry.opened_at {
                if opened_at.elapsed() >= self.config.cooldown {
                    entry.state = CircuitState::HalfOpen;
                    entry.probe_in_flight = false;
                }
            }
        }
        entry.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 20,
            window_duration: Duration::from_secs(60),
            failure_ratio_threshold: 0.5,
            min_samples: 5,
            cooldown: Duration::from_millis(20),
        }
    }

    #[test]
    fn trips_open_after_failure_ratio_exceeded() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            assert_eq!(cb.admit("m"), Admission::Allow);
            cb.record("m", false);
        }
        assert_eq!(cb.admit("m"), Admission::Allow);
        cb.record("m", false);
        assert_eq!(cb.admit("m"), Admission::Allow);
        cb.record("m", false);
        assert_eq!(cb.state("m"), CircuitState::Open);
        assert_eq!(cb.admit("m"), Admission::Deny);
    }

    #[test]
    fn half_opens_after_cooldown_and_closes_on_probe_success() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..5 {
            cb.admit("m");
            cb.record("m", false);
        }
        assert_eq!(cb.state("m"), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.admit("m"), Admission::AllowAsProbe);
        cb.record("m", true);
        assert_eq!(cb.state("m"), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_probe_failure() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..5 {
            cb.admit("m");
            cb.record("m", false);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.admit("m"), Admission::AllowAsProbe);
        cb.record("m", false);
        assert_eq!(cb.state("m"), CircuitState::Open);
    }

    #[test]
    fn stays_closed_below_min_samples() {
        let cb = CircuitBreaker::new(fast_config());
        cb.admit("m");
        cb.record("m", false);
        cb.admit("m");
        cb.record("m", false);
        assert_eq!(cb.state("m"), CircuitState::Closed);
    }
}
