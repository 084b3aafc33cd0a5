//! In-process cache backend for development and tests.

use crate::connection::{ConnectionMonitor, ConnectionState};
use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// DashMap-backed cache with TTLs.
///
/// The backend can be marked disconnected or made to fail operations, which
/// lets callers exercise degraded paths without a real server.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    monitor: ConnectionMonitor,
    failing: AtomicBool,
    operations: AtomicU64,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            monitor: ConnectionMonitor::new("memory", ConnectionState::Connected),
            failing: AtomicBool::new(false),
            operations: AtomicU64::new(0),
        }
    }

    /// Mark the backend connected or disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.monitor.set(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    /// Make every operation fail with a connection error while the backend
    /// still reports itself connected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Operations that reached this backend.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self) -> CacheResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if !self.monitor.is_connected() {
            return Err(CacheError::Connection("backend disconnected".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        self.begin()?;
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.begin()?;
        if ttl.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.begin()?;
        self.entries.remove(key);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
