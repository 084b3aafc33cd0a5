//! In-memory rate limit store
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for single-instance
//! deployments or testing. For distributed deployments, use the Redis store.

use crate::error::RateLimitResult;
use crate::policy::RateLimitPolicy;
use crate::stores::{RateLimitStore, WindowState};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct Counter {
    count: u64,
    window_start: Instant,
    window: Duration,
    blocked_until: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        let window_over = now.duration_since(self.window_start) >= self.window;
        let block_over = self.blocked_until.is_none_or(|until| until <= now);
        window_over && block_over
    }
}

/// In-memory rate limit store
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, Counter>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory rate limit store");
        Self::default()
    }

    /// Get the number of tracked keys (for monitoring)
    pub fn key_count(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn consume(&self, key: &str, policy: &RateLimitPolicy) -> RateLimitResult<WindowState> {
        let now = Instant::now();

        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Counter {
                count: 0,
                window_start: now,
                window: policy.duration,
                blocked_until: None,
            });

        if let Some(until) = entry.blocked_until {
            if until > now {
                trace!(key = %key, "Memory store: blocked");
                return Ok(WindowState {
                    consumed: entry.count,
                    reset_after: until - now,
                    blocked: true,
                });
            }
            entry.blocked_until = None;
        }

        // Check if we're in a new window
        if now.duration_since(entry.window_start) >= policy.duration {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.window = policy.duration;
        entry.count += 1;

        let mut reset_after = policy.duration - now.duration_since(entry.window_start);
        if entry.count > policy.points && !policy.block_duration.is_zero() {
            entry.blocked_until = Some(now + policy.block_duration);
            reset_after = policy.block_duration;
        }

        trace!(key = %key, consumed = entry.count, "Memory store: consumed");
        Ok(WindowState {
            consumed: entry.count,
            reset_after,
            blocked: false,
        })
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit state");
        self.counters.remove(key);
        Ok(())
    }

    async fn cleanup(&self) -> RateLimitResult<()> {
        let now = Instant::now();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        debug!(remaining = self.counters.len(), "Cleaned up expired entries");
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(points: u64, secs: u64) -> RateLimitPolicy {
        RateLimitPolicy::new("test", points, Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_within_window() {
        let store = MemoryStore::new();
        let policy = policy(3, 60);

        for expected in 1..=3 {
            let state = store.consume("k", &policy).await.unwrap();
            assert_eq!(state.consumed, expected);
            assert!(state.is_allowed(&policy));
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        let state = store.consume("k", &policy).await.unwrap();
        assert!(!state.is_allowed(&policy));
        assert_eq!(state.reset_after, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let store = MemoryStore::new();
        let policy = policy(1, 10);

        store.consume("k", &policy).await.unwrap();
        assert!(!store.consume("k", &policy).await.unwrap().is_allowed(&policy));

        tokio::time::advance(Duration::from_secs(10)).await;
        let state = store.consume("k", &policy).await.unwrap();
        assert_eq!(state.consumed, 1);
        assert!(state.is_allowed(&policy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_duration_outlasts_window() {
        let store = MemoryStore::new();
        let policy = policy(1, 10).with_block_duration(Duration::from_secs(60));

        store.consume("k", &policy).await.unwrap();
        let exceeded = store.consume("k", &policy).await.unwrap();
        assert!(!exceeded.is_allowed(&policy));
        assert_eq!(exceeded.reset_after, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        let blocked = store.consume("k", &policy).await.unwrap();
        assert!(blocked.blocked);
        assert_eq!(blocked.reset_after, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.consume("k", &policy).await.unwrap().is_allowed(&policy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_cleanup() {
        let store = MemoryStore::new();
        let policy = policy(1, 10);

        store.consume("a", &policy).await.unwrap();
        store.consume("a", &policy).await.unwrap();
        store.reset("a").await.unwrap();
        assert!(store.consume("a", &policy).await.unwrap().is_allowed(&policy));

        store.consume("b", &policy).await.unwrap();
        assert_eq!(store.key_count(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        store.cleanup().await.unwrap();
        assert_eq!(store.key_count(), 0);
        assert_eq!(store.store_type(), "memory");
    }
}
