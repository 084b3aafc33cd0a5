//! Redis rate limit store
//!
//! Uses Redis for distributed rate limiting across multiple instances.
//! Requires the `redis` feature to be enabled.

use crate::error::{RateLimitError, RateLimitResult};
use crate::policy::RateLimitPolicy;
use crate::stores::{RateLimitStore, WindowState};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Block check, increment, first-hit expiry and block-on-exceed in one step.
///
/// Returns `{consumed, ttl_ms, blocked}`.
const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local block_key = KEYS[2]
local points = tonumber(ARGV[1])
local duration_ms = tonumber(ARGV[2])
local block_ms = tonumber(ARGV[3])

local blocked_ttl = redis.call('PTTL', block_key)
if blocked_ttl > 0 then
    local current = tonumber(redis.call('GET', key)) or 0
    return {current, blocked_ttl, 1}
end

local consumed = redis.call('INCR', key)
if consumed == 1 then
    redis.call('PEXPIRE', key, duration_ms)
end

local ttl = redis.call('PTTL', key)
if ttl < 0 then
    redis.call('PEXPIRE', key, duration_ms)
    ttl = duration_ms
end

if consumed > points and block_ms > 0 then
    redis.call('SET', block_key, 1, 'PX', block_ms)
    ttl = block_ms
end

return {consumed, ttl, 0}
"#;

/// Redis-backed rate limit store
///
/// The connection is opened on first use, so an unreachable server surfaces
/// as a store error on each call instead of failing startup.
pub struct RedisStore {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
    script: Script,
}

impl RedisStore {
    /// Create a new Redis store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: &str) -> RateLimitResult<Self> {
        debug!(url = %url, "Configuring Redis for rate limiting");
        let client = Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            connect_timeout: Duration::from_secs(1),
            script: Script::new(CONSUME_SCRIPT),
        })
    }

    /// Bound how long a connection attempt may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn connection(&self) -> RateLimitResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let connect = ConnectionManager::new(self.client.clone());
                match tokio::time::timeout(self.connect_timeout, connect).await {
                    Ok(result) => result.map_err(RateLimitError::from),
                    Err(_) => Err(RateLimitError::store(format!(
                        "Redis connection timed out after {:?}",
                        self.connect_timeout
                    ))),
                }
            })
            .await?;
        Ok(conn.clone())
    }
}

fn block_key(key: &str) -> String {
    format!("{key}:blocked")
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn consume(&self, key: &str, policy: &RateLimitPolicy) -> RateLimitResult<WindowState> {
        let mut conn = self.connection().await?;

        let (consumed, ttl_ms, blocked): (u64, u64, u8) = self
            .script
            .key(key)
            .key(block_key(key))
            .arg(policy.points)
            .arg(millis(policy.duration).max(1))
            .arg(millis(policy.block_duration))
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, consumed, ttl_ms, blocked, "Redis store: consumed");
        Ok(WindowState {
            consumed,
            reset_after: Duration::from_millis(ttl_ms),
            blocked: blocked == 1,
        })
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit state in Redis");
        let mut conn = self.connection().await?;
        let _: () = conn.del(vec![key.to_string(), block_key(key)]).await?;
        Ok(())
    }

    async fn cleanup(&self) -> RateLimitResult<()> {
        debug!("Redis cleanup is automatic via TTL");
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.is_connected())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
