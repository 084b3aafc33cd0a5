//! Redis cache backend.
//!
//! The connection is established once at startup, retried with exponential
//! backoff and jitter. A backend that never connected, or that lost its
//! connection, stays usable: it reports itself disconnected and a background
//! probe reconnects it.

use crate::config::RedisConnectConfig;
use crate::connection::{ConnectionMonitor, ConnectionState};
use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

struct RedisInner {
    client: Client,
    config: RedisConnectConfig,
    connection: RwLock<Option<ConnectionManager>>,
    monitor: ConnectionMonitor,
}

/// Redis cache store.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<RedisInner>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.inner.config.url)
            .field("state", &self.inner.monitor.state())
            .finish()
    }
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// Only an unparseable URL is an error. When every attempt fails the
    /// cache is returned disconnected.
    ///
    /// ```no_run
    /// use questline_cache::{RedisCache, RedisConnectConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), questline_cache::CacheError> {
    ///     let cache = RedisCache::connect(RedisConnectConfig::new("redis://localhost:6379")).await?;
    ///     println!("connected: {}", cache.connection_state());
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: RedisConnectConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Config(format!("invalid Redis URL: {e}")))?;

        let inner = Arc::new(RedisInner {
            client,
            config,
            connection: RwLock::new(None),
            monitor: ConnectionMonitor::new("redis", ConnectionState::Disconnected),
        });

        inner.connect_with_backoff().await;

        if let Some(interval) = inner.config.health_check_interval {
            tokio::spawn(watch(Arc::downgrade(&inner), interval));
        }

        Ok(Self { inner })
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.monitor.state()
    }

    /// Try once to (re)establish the connection.
    pub async fn reconnect(&self) -> bool {
        self.inner.try_connect().await
    }

    fn connection(&self) -> CacheResult<ConnectionManager> {
        self.inner
            .connection
            .read()
            .clone()
            .ok_or_else(|| CacheError::Connection("not connected".to_string()))
    }

    /// Update the connection state from an operation result.
    fn observe<T>(&self, result: Result<T, redis::RedisError>) -> CacheResult<T> {
        match result {
            Ok(value) => {
                self.inner.monitor.set(ConnectionState::Connected);
                Ok(value)
            }
            Err(e) => {
                let error = CacheError::Redis(e);
                if error.is_connection_error() {
                    self.inner.monitor.set(ConnectionState::Disconnected);
                }
                Err(error)
            }
        }
    }
}

impl RedisInner {
    async fn connect_with_backoff(&self) {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            if self.try_connect().await {
                return;
            }
            if attempt < attempts {
                let delay = self.config.backoff.jittered_delay(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying Redis connection"
                );
                tokio::time::sleep(delay).await;
            }
        }
        warn!(
            url = %self.config.url,
            attempts,
            "Redis unavailable, cache will treat reads as misses"
        );
    }

    async fn try_connect(&self) -> bool {
        let existing = self.connection.read().clone();
        if let Some(mut conn) = existing {
            let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
            let ok = pong.is_ok();
            self.monitor.set(if ok {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            });
            return ok;
        }

        let attempt = tokio::time::timeout(
            self.config.connection_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await;

        match attempt {
            Ok(Ok(manager)) => {
                *self.connection.write() = Some(manager);
                self.monitor.set(ConnectionState::Connected);
                info!(url = %self.config.url, "Redis cache connected");
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Redis connection attempt failed");
                self.monitor.set(ConnectionState::Disconnected);
                false
            }
            Err(_) => {
                debug!("Redis connection attempt timed out");
                self.monitor.set(ConnectionState::Disconnected);
                false
            }
        }
    }
}

async fn watch(inner: Weak<RedisInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !inner.monitor.is_connected() {
            inner.try_connect().await;
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection()?;
        self.observe(conn.get(key).await)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection()?;
        if ttl.is_zero() {
            let result: Result<(), _> = conn.del(key).await;
            return self.observe(result);
        }
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.observe(conn.pset_ex(key, value, ttl_millis).await)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let result: Result<(), _> = conn.del(key).await;
        self.observe(result)
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.monitor.state()
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_resilience::RetryPolicy;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisCache::connect(RedisConnectConfig::new("not a url")).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_starts_disconnected() {
        let config = RedisConnectConfig::new("redis://127.0.0.1:1")
            .with_connect_attempts(2)
            .with_backoff(RetryPolicy::new().with_min_delay(Duration::from_millis(1)))
            .with_connection_timeout(Duration::from_millis(200))
            .with_health_check_interval(None);

        let cache = RedisCache::connect(config).await.unwrap();
        assert_eq!(cache.connection_state(), ConnectionState::Disconnected);
        assert!(cache.get_raw("k").await.is_err());
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_round_trip() {
        let cache = RedisCache::connect(RedisConnectConfig::new("redis://127.0.0.1:6379"))
            .await
            .unwrap();
        assert!(cache.is_connected());

        cache
            .set_raw("questline:test:key", "42".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            cache.get_raw("questline:test:key").await.unwrap().as_deref(),
            Some("42")
        );
        cache.delete("questline:test:key").await.unwrap();
        assert_eq!(cache.get_raw("questline:test:key").await.unwrap(), None);
    }
}
