//! Model Registry & Metadata Provider (§4.1).
//!
//! Two variants share one capability, `describe(model_id) -> ModelDescriptor`:
//! a static provider backed by a bundled manifest, and a dynamic provider
//! that refreshes from a remote source off the hot path, keyed by a short
//! TTL, falling back to stale-but-served data when a refresh fails.

use crate::error::Result;
use crate::model::descriptor::ModelDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Narrow capability exposed by every registry variant.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn describe(&self, model_id: &str) -> Option<ModelDescriptor>;

    /// All descriptors currently known, used by the Tier Selector to build
    /// its candidate pool. Order is unspecified.
    async fn all(&self) -> Vec<ModelDescriptor>;
}

/// A remote source the dynamic provider refreshes from. Out of scope per
/// §1 ("Configuration loading ... Local model hosting specifics" and the
/// gateway transport contract); this crate only defines the capability and
/// a TTL cache around it.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ModelDescriptor>>;
}

/// Bundled, never-changes-at-runtime manifest. The reference manifest
/// format is a JSON array of `ModelDescriptor` (the host family's existing
/// `serde_json` dependency covers this without adding a YAML parser).
pub struct StaticRegistry {
    descriptors: HashMap<String, ModelDescriptor>,
}

impl StaticRegistry {
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Self {
        let descriptors = descriptors
            .into_iter()
            .map(|d| (d.model_id.clone(), d))
            .collect();
        Self { descriptors }
    }

    pub fn from_manifest_json(json: &str) -> Result<Self> {
        let descriptors: Vec<ModelDescriptor> = serde_json::from_str(json)?;
        Ok(Self::new(descriptors))
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn describe(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.descriptors.get(model_id).cloned()
    }

    async fn all(&self) -> Vec<ModelDescriptor> {
        self.descriptors.values().cloned().collect()
    }
}

struct CachedSnapshot {
    descriptors: HashMap<String, ModelDescriptor>,
    fetched_at: DateTime<Utc>,
}

/// Periodically refreshes from a `MetadataSource`, serving the last-known-good
/// snapshot (possibly the static fallback) whenever a refresh fails or the
/// TTL hasn't expired yet. Never blocks a caller on the network: a refresh is
/// only attempted the first time a `describe`/`all` call observes a stale
/// snapshot, and failures are logged and swallowed.
pub struct DynamicRegistry {
    source: Arc<dyn MetadataSource>,
    fallback: StaticRegistry,
    ttl: Duration,
    snapshot: RwLock<Option<CachedSnapshot>>,
}

impl DynamicRegistry {
    pub fn new(source: Arc<dyn MetadataSource>, fallback: StaticRegistry, ttl_minutes: i64) -> Self {
        Self {
            source,
            fallback,
            ttl: Duration::minutes(ttl_minutes),
            snapshot: RwLock::new(None),
        }
    }

    async fn ensure_fresh(&self) {
        let is_stale = {
            let guard = self.snapshot.read().await;
            match guard.as_ref() {
                Some(s) => Utc::now() - s.fetched_at > self.ttl,
                None => true,
            }
        };
        if !is_stale {
            return;
        }
        match self.source.fetch().await {
            Ok(descriptors) => {
                let map = descriptors.into_iter().map(|d| (d.model_id.clone(), d)).collect();
                let mut guard = self.snapshot.write().await;
                *guard = Some(CachedSnapshot {
                    descriptors: map,
                    fetched_at: Utc::now(),
                });
                debug!("dynamic registry refreshed");
            }
            Err(e) => {
                warn!(error = %e, "dynamic registry fetch failed, serving stale/static data");
            }
        }
    }
}

#[async_trait]
impl Registry for DynamicRegistry {
    async fn describe(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.ensure_fresh().await;
        let guard = self.snapshot.read().await;
        if let Some(snapshot) = guard.as_ref() {
            if let Some(d) = snapshot.descriptors.get(model_id) {
                return Some(d.clone());
            }
        }
        drop(guard);
        self.fallback.describe(model_id).await
    }

    async fn all(&self) -> Vec<ModelDescriptor> {
        self.ensure_fresh().await;
        let guard = self.snapshot.read().await;
        match guard.as_ref() {
            Some(snapshot) if !snapshot.descriptors.is_empty() => {
                snapshot.descriptors.values().cloned().collect()
            }
            _ => self.fallback.all().await,
        }
    }
}

/// Chooses a concrete registry variant at startup from the `offline` flag
/// and `model_intelligence_enabled` config (§4.1 provider factory).
pub fn build_registry(
    offline: bool,
    model_intelligence_enabled: bool,
    fallback: StaticRegistry,
    source: Option<Arc<dyn MetadataSource>>,
) -> Arc<dyn Registry> {
    match (offline, model_intelligence_enabled, source) {
        (false, true, Some(source)) => Arc::new(DynamicRegistry::new(source, fallback, 5)),
        _ => Arc::new(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::{Availability, Pricing};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.to_string(),
            provider: "test".to_string(),
            tier: crate::config::Tier::Standard,
            context_window: 128_000,
            pricing: Pricing {
                input_cost_per_m: 1.0,
                output_cost_per_m: 2.0,
            },
            quality_score: 0.8,
            capabilities: HashSet::new(),
            hardware_profile: None,
            availability: Availability::Available,
        }
    }

    #[tokio::test]
    async fn static_registry_round_trips() {
        let registry = StaticRegistry::new(vec![descriptor("a"), descriptor("b")]);
        assert!(registry.describe("a").await.is_some());
        assert!(registry.describe("missing").await.is_none());
        assert_eq!(registry.all().await.len(), 2);
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetadataSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<ModelDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::error::Error::internal("fetch failed"))
            } else {
                Ok(vec![descriptor("dynamic-a")])
            }
        }
    }

    #[tokio::test]
    async fn dynamic_registry_falls_back_on_fetch_failure() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let fallback = StaticRegistry::new(vec![descriptor("static-a")]);
        let registry = DynamicRegistry::new(source, fallback, 5);

        let d = registry.describe("static-a").await;
        assert!(d.is_some());
        assert!(registry.describe("dynamic-a").await.is_none());
    }

    #[tokio::test]
    async fn dynamic_registry_serves_fresh_data_after_successful_fetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let fallback = StaticRegistry::new(vec![descriptor("static-a")]);
        let registry = DynamicRegistry::new(source, fallback, 5);

        let d = registry.describe("dynamic-a").await;
        assert!(d.is_some());
    }
}
