//! Rate limiter configuration and builder

use crate::RateLimiter;
use crate::burst::BurstLimiter;
use crate::error::{RateLimitError, RateLimitResult};
use crate::extractor::KeyExtractor;
use crate::policy::{PolicyRouting, RateLimitPolicy};
use crate::stores::{MemoryStore, RateLimitStore, StoreType};
use questline_resilience::DegradationPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// User agent fragments treated as automated clients.
pub const DEFAULT_BOT_PATTERNS: [&str; 5] = ["bot", "crawler", "spider", "scraper", "headless"];

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Store type (memory, redis)
    pub store_type: StoreType,
    /// Key prefix for storage
    pub key_prefix: String,
    /// Which policy applies to which path
    pub routing: PolicyRouting,
    /// Burst points per `burst_window`, zero to disable
    pub burst_points: u64,
    pub burst_window: Duration,
    /// What to do when the counter store is unreachable
    pub on_store_failure: DegradationPolicy,
    /// Path prefixes never limited
    pub exempt_prefixes: Vec<String>,
    /// Lowercase user agent fragments rejected outright
    pub bot_patterns: Vec<String>,
    /// Whether quotas are enforced at all (bots are rejected regardless)
    pub enforce: bool,
    /// How the actor is identified
    pub key_extractor: KeyExtractor,
    /// How often expired local counters are dropped, `None` to never
    pub cleanup_interval: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            key_prefix: "ratelimit".to_string(),
            routing: PolicyRouting::default(),
            burst_points: 10,
            burst_window: Duration::from_secs(1),
            on_store_failure: DegradationPolicy::FailOpen,
            exempt_prefixes: vec!["/api/auth".to_string()],
            bot_patterns: DEFAULT_BOT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            enforce: true,
            key_extractor: KeyExtractor::UserOrIp,
            cleanup_interval: Some(Duration::from_secs(60)),
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Check if a path bypasses rate limiting
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Check if a user agent looks automated
    pub fn is_bot(&self, user_agent: &str) -> bool {
        let user_agent = user_agent.to_ascii_lowercase();
        self.bot_patterns
            .iter()
            .any(|pattern| user_agent.contains(pattern.as_str()))
    }

    /// Build the full store key for an actor under a policy.
    pub fn store_key(&self, policy: &str, actor: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, policy, actor)
    }
}

/// Builder for creating a RateLimiter
pub struct RateLimiterBuilder {
    config: RateLimitConfig,
    store: Option<Arc<dyn RateLimitStore>>,
    #[cfg(feature = "redis")]
    redis_url: Option<String>,
}

impl RateLimiterBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
            store: None,
            #[cfg(feature = "redis")]
            redis_url: None,
        }
    }

    /// Apply one policy to every path
    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.config.routing = PolicyRouting::Global(policy);
        self
    }

    /// Limit paths under `prefix` with `policy`.
    ///
    /// The first route switches to prefix routing; unmatched paths are then
    /// not limited.
    pub fn route(mut self, prefix: impl Into<String>, policy: RateLimitPolicy) -> Self {
        let entry = (prefix.into(), policy);
        if let PolicyRouting::ByPrefix(routes) = &mut self.config.routing {
            routes.push(entry);
        } else {
            self.config.routing = PolicyRouting::ByPrefix(vec![entry]);
        }
        self
    }

    pub fn routing(mut self, routing: PolicyRouting) -> Self {
        self.config.routing = routing;
        self
    }

    /// Set the process-local burst limit
    pub fn burst(mut self, points: u64, window: Duration) -> Self {
        self.config.burst_points = points;
        self.config.burst_window = window;
        self
    }

    /// Disable the burst limiter
    pub fn without_burst(self) -> Self {
        self.burst(0, Duration::ZERO)
    }

    /// Behaviour when the counter store fails
    pub fn on_store_failure(mut self, policy: DegradationPolicy) -> Self {
        self.config.on_store_failure = policy;
        self
    }

    /// Use in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.config.store_type = StoreType::Memory;
        self
    }

    /// Use Redis store for distributed rate limiting
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, url: &str) -> Self {
        self.config.store_type = StoreType::Redis;
        self.redis_url = Some(url.to_string());
        self
    }

    /// Use a caller-provided store
    pub fn store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the key prefix for storage
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Replace the exempt path prefixes
    pub fn exempt_prefixes(mut self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.exempt_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Add an exempt path prefix
    pub fn exempt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.exempt_prefixes.push(prefix.into());
        self
    }

    /// Replace the bot user agent patterns
    pub fn bot_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.bot_patterns = patterns
            .into_iter()
            .map(|p| Into::<String>::into(p).to_ascii_lowercase())
            .collect();
        self
    }

    /// Enforce quotas or only reject bots
    pub fn enforce(mut self, enforce: bool) -> Self {
        self.config.enforce = enforce;
        self
    }

    pub fn key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.config.key_extractor = extractor;
        self
    }

    /// Period of the background sweep started by
    /// [`RateLimiter::spawn_cleanup`].
    pub fn cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.cleanup_interval = interval.filter(|i| !i.is_zero());
        self
    }

    /// Build the rate limiter
    pub async fn build(self) -> RateLimitResult<RateLimiter> {
        self.config.routing.validate()?;
        if self.config.key_prefix.is_empty() {
            return Err(RateLimitError::config("key prefix must not be empty"));
        }

        debug!(
            store_type = ?self.config.store_type,
            routing = ?self.config.routing,
            burst_points = self.config.burst_points,
            "Building rate limiter"
        );

        let store: Arc<dyn RateLimitStore> = match (self.store, &self.config.store_type) {
            (Some(store), _) => store,
            (None, StoreType::Memory) => Arc::new(MemoryStore::new()),
            #[cfg(feature = "redis")]
            (None, StoreType::Redis) => {
                let url = self.redis_url.ok_or_else(|| {
                    RateLimitError::config("Redis URL must be specified for Redis store")
                })?;
                Arc::new(crate::stores::RedisStore::new(&url)?)
            }
            #[cfg(not(feature = "redis"))]
            (None, StoreType::Redis) => {
                return Err(RateLimitError::config(
                    "Redis store requires the `redis` feature",
                ));
            }
        };

        let burst = BurstLimiter::new(self.config.burst_points, self.config.burst_window);
        Ok(RateLimiter::new(store, burst, self.config))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.key_prefix, "ratelimit");
        assert_eq!(config.burst_points, 10);
        assert_eq!(config.on_store_failure, DegradationPolicy::FailOpen);
        assert_eq!(config.routing.select("/x").unwrap().points, 100);
        assert!(config.enforce);
        assert_eq!(config.cleanup_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_exemptions_and_bots() {
        let config = RateLimitConfig::default();
        assert!(config.is_exempt("/api/auth/login"));
        assert!(!config.is_exempt("/api/quests"));

        assert!(config.is_bot("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(config.is_bot("HeadlessChrome/120.0"));
        assert!(!config.is_bot("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"));
    }

    #[test]
    fn test_store_key() {
        let config = RateLimitConfig::default();
        assert_eq!(config.store_key("global", "user:7"), "ratelimit:global:user:7");
    }

    #[tokio::test]
    async fn test_route_switches_to_prefix_routing() {
        let limiter = RateLimiterBuilder::new()
            .route("/api/uploads", RateLimitPolicy::new("uploads", 5, Duration::from_secs(60)))
            .route("/api", RateLimitPolicy::new("api", 50, Duration::from_secs(60)))
            .build()
            .await
            .unwrap();

        let routing = &limiter.config().routing;
        assert_eq!(routing.select("/api/uploads/1").unwrap().name, "uploads");
        assert!(routing.select("/static/app.js").is_none());
    }

    #[tokio::test]
    async fn test_invalid_policy_fails_build() {
        let result = RateLimiterBuilder::new()
            .policy(RateLimitPolicy::new("global", 0, Duration::from_secs(60)))
            .build()
            .await;
        assert!(matches!(result, Err(RateLimitError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_bot_patterns_are_lowercased() {
        let limiter = RateLimiterBuilder::new()
            .bot_patterns(["Python-Requests"])
            .build()
            .await
            .unwrap();
        assert!(limiter.config().is_bot("python-requests/2.31"));
        assert!(!limiter.config().is_bot("Googlebot"));
    }
}
