//! Rate limit storage backends
//!
//! This module provides the window counter stores:
//!
//! - **Memory**: In-memory storage using DashMap (single-instance)
//! - **Redis**: Distributed storage for multi-instance deployments

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::error::RateLimitResult;
use crate::policy::RateLimitPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store type for rate limiting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// In-memory store (single instance only)
    #[default]
    Memory,
    /// Redis store (distributed)
    Redis,
}

/// Counter state after a consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Points consumed in the current window, this request included
    pub consumed: u64,
    /// Time until the window, or the block, ends
    pub reset_after: Duration,
    /// The actor is serving a block; nothing was consumed
    pub blocked: bool,
}

impl WindowState {
    /// Whether the request fits the policy.
    pub fn is_allowed(&self, policy: &RateLimitPolicy) -> bool {
        !self.blocked && self.consumed <= policy.points
    }

    pub fn remaining(&self, policy: &RateLimitPolicy) -> u64 {
        policy.points.saturating_sub(self.consumed)
    }
}

/// Trait for rate limit storage backends
///
/// `consume` must be atomic per key: concurrent consumers of one key never
/// observe the same count.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Consume one point from `key` under `policy`.
    ///
    /// Once the count passes `policy.points` and the policy has a block
    /// duration, the key stays blocked for that long.
    async fn consume(&self, key: &str, policy: &RateLimitPolicy) -> RateLimitResult<WindowState>;

    /// Reset rate limit state for a key, block included
    async fn reset(&self, key: &str) -> RateLimitResult<()>;

    /// Clean up expired entries (optional, for memory optimization)
    async fn cleanup(&self) -> RateLimitResult<()> {
        Ok(())
    }

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
