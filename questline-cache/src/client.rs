//! Breaker-guarded cache client.

use crate::config::CacheConfig;
use crate::connection::ConnectionState;
use crate::error::CacheError;
use crate::traits::CacheStore;
use questline_resilience::{
    CircuitBreaker, CircuitState, Pipeline, PipelineRegistry, ResilienceError, TracingListener,
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot of the cache's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheHealth {
    pub backend: &'static str,
    pub connection: ConnectionState,
    pub breaker: Option<CircuitState>,
}

impl CacheHealth {
    pub fn is_available(&self) -> bool {
        self.connection == ConnectionState::Connected && self.breaker != Some(CircuitState::Open)
    }
}

/// Cache client that never surfaces backend trouble to the caller.
///
/// Reads degrade to misses and writes to no-ops when the backend is
/// disconnected, failing, or its breaker is open. The backend is not
/// contacted at all while it is known to be unavailable.
///
/// ```
/// use questline_cache::{CacheClient, CacheConfig, InMemoryCache};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let cache = CacheClient::new(Arc::new(InMemoryCache::new()), CacheConfig::default());
/// cache.set("quest:7", &42u32, 60).await;
/// assert_eq!(cache.get::<u32>("quest:7").await, Some(42));
/// # });
/// ```
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
    pipeline: Arc<Pipeline>,
    config: Arc<CacheConfig>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.store.backend_name())
            .field("target", &self.pipeline.target())
            .field("key_prefix", &self.config.key_prefix)
            .finish()
    }
}

impl CacheClient {
    /// Create a client with its own breaker.
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        let pipeline = Pipeline::new(
            config.target_id(),
            config.pipeline.clone(),
            vec![Arc::new(TracingListener)],
        );
        Self {
            store,
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    /// Create a client whose breaker lives in a shared registry.
    pub fn with_registry(
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
        registry: &PipelineRegistry,
    ) -> Self {
        let pipeline_config = config.pipeline.clone();
        let pipeline = registry.pipeline_with(&config.target_id(), || pipeline_config);
        Self {
            store,
            pipeline,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.pipeline.breaker()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    pub fn breaker_state(&self) -> Option<CircuitState> {
        self.pipeline.state()
    }

    /// Whether an operation right now would reach the backend.
    pub fn is_available(&self) -> bool {
        self.store.is_connected() && !self.pipeline.is_open()
    }

    pub fn health(&self) -> CacheHealth {
        CacheHealth {
            backend: self.store.backend_name(),
            connection: self.store.connection_state(),
            breaker: self.pipeline.state(),
        }
    }

    /// Get a value. Any failure is reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.ready("get", key) {
            return None;
        }
        let full_key = self.config.build_key(key);
        let store = &self.store;

        let raw = match self.pipeline.execute(|| store.get_raw(&full_key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                self.degraded("get", key, &e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            }
        }
    }

    /// Store a value with a TTL in seconds. Failures are logged and ignored.
    ///
    /// A TTL of zero removes the key on every backend.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        if !self.ready("set", key) {
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Value could not be encoded, skipping cache write");
                return;
            }
        };
        let full_key = self.config.build_key(key);
        let ttl = Duration::from_secs(ttl_secs);
        let store = &self.store;

        if let Err(e) = self
            .pipeline
            .execute(|| store.set_raw(&full_key, raw.clone(), ttl))
            .await
        {
            self.degraded("set", key, &e);
        }
    }

    /// Delete a key. Failures are logged and ignored.
    pub async fn delete(&self, key: &str) {
        if !self.ready("delete", key) {
            return;
        }
        let full_key = self.config.build_key(key);
        let store = &self.store;

        if let Err(e) = self.pipeline.execute(|| store.delete(&full_key)).await {
            self.degraded("delete", key, &e);
        }
    }

    fn ready(&self, op: &'static str, key: &str) -> bool {
        if !self.store.is_connected() {
            debug!(op, key = %key, backend = self.store.backend_name(), "Cache disconnected, skipping");
            return false;
        }
        if self.pipeline.is_open() {
            debug!(op, key = %key, "Cache circuit open, skipping");
            return false;
        }
        true
    }

    fn degraded(&self, op: &'static str, key: &str, error: &ResilienceError<CacheError>) {
        if error.is_circuit_open() {
            debug!(op, key = %key, "Cache circuit open, skipping");
        } else {
            warn!(op, key = %key, error = %error, "Cache operation failed, degrading");
        }
    }
}
