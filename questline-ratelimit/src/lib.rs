//! # Questline Rate Limiting
//!
//! Admission control for inbound requests. Each actor (an authenticated
//! user, otherwise a client address) gets a quota in a shared counter store
//! plus a short process-local burst allowance.
//!
//! ## Features
//!
//! - **Window limiter**: N points per window in Redis, one atomic script per
//!   request, with optional blocking once exceeded
//! - **Burst limiter**: fixed window per actor in process memory
//! - **Degradation**: fail open or closed when the store is unreachable
//! - **Prefix policies**: different quotas per URL path prefix
//! - **Standard Headers**: `X-RateLimit-Limit`, `X-RateLimit-Remaining`,
//!   `X-RateLimit-Reset`, `Retry-After`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use questline_ratelimit::{RateLimitGuard, RateLimitPolicy, RateLimiter, RequestInfo};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::builder()
//!     .redis_store("redis://localhost:6379")
//!     .policy(RateLimitPolicy::new("global", 100, Duration::from_secs(900)))
//!     .build()
//!     .await?;
//! let guard = RateLimitGuard::new(Arc::new(limiter));
//!
//! let request = RequestInfo::new("/api/quests", "GET").with_user_id("42");
//! match guard.admit(&request).await {
//!     Ok(admission) => println!("allowed: {admission:?}"),
//!     Err(e) => println!("{}: {e}", e.status_code()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod burst;
pub mod config;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod policy;
pub mod stores;

pub use burst::{BurstCheck, BurstLimiter};
pub use config::{DEFAULT_BOT_PATTERNS, RateLimitConfig, RateLimiterBuilder};
pub use error::{RateLimitError, RateLimitHeaders, RateLimitResult};
pub use extractor::{KeyExtractor, RequestInfo};
pub use guard::RateLimitGuard;
pub use policy::{GLOBAL_POLICY, PolicyRouting, RateLimitPolicy};
pub use stores::{MemoryStore, RateLimitStore, StoreType, WindowState};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

use error::ceil_secs;
use questline_resilience::DegradationPolicy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Policy name reported when the burst limiter rejects.
pub const BURST_POLICY: &str = "burst";

/// Why a request was let through without consuming quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExemptPath,
    NotEnforced,
    NoPolicy,
    NoActor,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExemptPath => write!(f, "exempt path"),
            Self::NotEnforced => write!(f, "not enforced"),
            Self::NoPolicy => write!(f, "no policy for path"),
            Self::NoActor => write!(f, "no actor key"),
        }
    }
}

/// A request that may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Quota consumed and within limits
    Allowed {
        actor: String,
        policy: String,
        limit: u64,
        remaining: u64,
        /// Time until the window resets
        reset_after: Duration,
    },
    /// The store was unreachable and the limiter fails open
    Degraded { actor: String, policy: String },
    /// Limiting did not apply
    Skipped(SkipReason),
}

impl Admission {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Actor the request was counted against, if any
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::Allowed { actor, .. } | Self::Degraded { actor, .. } => Some(actor),
            Self::Skipped(_) => None,
        }
    }

    /// Rate limit headers for the response, when quota was consumed
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::Allowed {
                limit,
                remaining,
                reset_after,
                ..
            } => Some(RateLimitHeaders::allowed(
                *limit,
                *remaining,
                ceil_secs(*reset_after),
            )),
            _ => None,
        }
    }
}

/// Window limiter over a shared store, fronted by a local burst limiter
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    burst: BurstLimiter,
    config: RateLimitConfig,
    degraded: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Create a new rate limiter with the given store and burst limiter
    pub fn new(store: Arc<dyn RateLimitStore>, burst: BurstLimiter, config: RateLimitConfig) -> Self {
        debug!(
            store_type = store.store_type(),
            burst_points = burst.points(),
            "Creating new rate limiter"
        );
        Self {
            store,
            burst,
            config,
            degraded: AtomicU64::new(0),
        }
    }

    /// Count one request from `actor` against `policy`.
    ///
    /// The burst limiter is consulted first; a burst rejection does not
    /// consume window quota.
    pub async fn check(&self, actor: &str, policy: &RateLimitPolicy) -> RateLimitResult<Admission> {
        trace!(actor = %actor, policy = %policy.name, "Checking rate limit");

        let burst = self.burst.try_acquire(actor);
        if !burst.allowed {
            info!(actor = %actor, retry_after = ?burst.reset_after, "Burst limit exceeded");
            return Err(RateLimitError::limit_exceeded(
                actor,
                BURST_POLICY,
                self.burst.points(),
                burst.reset_after,
            ));
        }

        let key = self.config.store_key(&policy.name, actor);
        match self.store.consume(&key, policy).await {
            Ok(state) if state.is_allowed(policy) => {
                trace!(actor = %actor, consumed = state.consumed, "Request allowed");
                Ok(Admission::Allowed {
                    actor: actor.to_string(),
                    policy: policy.name.clone(),
                    limit: policy.points,
                    remaining: state.remaining(policy),
                    reset_after: state.reset_after,
                })
            }
            Ok(state) => {
                info!(
                    actor = %actor,
                    policy = %policy.name,
                    blocked = state.blocked,
                    retry_after = ?state.reset_after,
                    "Rate limit exceeded"
                );
                Err(RateLimitError::limit_exceeded(
                    actor,
                    policy.name.as_str(),
                    policy.points,
                    state.reset_after,
                ))
            }
            Err(e) => self.degrade(actor, policy, e),
        }
    }

    fn degrade(
        &self,
        actor: &str,
        policy: &RateLimitPolicy,
        error: RateLimitError,
    ) -> RateLimitResult<Admission> {
        match self.config.on_store_failure {
            DegradationPolicy::FailOpen => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    actor = %actor,
                    policy = %policy.name,
                    error = %error,
                    "Rate limit store unavailable, allowing request (fail-open)"
                );
                Ok(Admission::Degraded {
                    actor: actor.to_string(),
                    policy: policy.name.clone(),
                })
            }
            DegradationPolicy::FailClosed => {
                warn!(
                    actor = %actor,
                    policy = %policy.name,
                    error = %error,
                    "Rate limit store unavailable, rejecting request (fail-closed)"
                );
                Err(RateLimitError::ServiceUnavailable(error.to_string()))
            }
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn burst(&self) -> &BurstLimiter {
        &self.burst
    }

    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }

    /// Requests let through because the store was unreachable
    pub fn degraded_admissions(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Reset every counter held for an actor
    pub async fn reset(&self, actor: &str) -> RateLimitResult<()> {
        debug!(actor = %actor, "Resetting rate limit");
        self.burst.reset(actor);
        for policy in self.config.routing.policies() {
            self.store
                .reset(&self.config.store_key(&policy.name, actor))
                .await?;
        }
        Ok(())
    }

    /// Drop expired local state
    pub async fn cleanup(&self) -> RateLimitResult<()> {
        self.burst.cleanup();
        self.store.cleanup().await
    }

    /// Run [`cleanup`](Self::cleanup) every `cleanup_interval` in the
    /// background.
    ///
    /// The task holds a weak reference and ends once the limiter is
    /// dropped. Returns `None` when no interval is configured.
    pub fn spawn_cleanup(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.cleanup_interval?;
        debug!(interval = ?interval, "Starting rate limit cleanup task");
        Some(tokio::spawn(sweep(Arc::downgrade(self), interval)))
    }
}

async fn sweep(limiter: Weak<RateLimiter>, period: Duration) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let Some(limiter) = limiter.upgrade() else {
            return;
        };
        if let Err(e) = limiter.cleanup().await {
            warn!(error = %e, "Rate limit cleanup failed");
        }
        trace!(burst_keys = limiter.burst.len(), "Rate limit cleanup finished");
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.store_type())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn limiter(points: u64) -> RateLimiter {
        RateLimiter::builder()
            .policy(RateLimitPolicy::new("global", points, Duration::from_secs(60)))
            .without_burst()
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_window_basic() {
        let limiter = limiter(3).await;
        let policy = limiter.config().routing.select("/").unwrap().clone();

        for remaining in (0..3).rev() {
            match limiter.check("user:1", &policy).await.unwrap() {
                Admission::Allowed {
                    remaining: left, ..
                } => assert_eq!(left, remaining),
                other => panic!("unexpected admission: {other:?}"),
            }
        }

        let err = limiter.check("user:1", &policy).await.unwrap_err();
        assert!(err.is_limit_exceeded());
    }

    #[tokio::test]
    async fn test_different_actors() {
        let limiter = limiter(1).await;
        let policy = RateLimitPolicy::new("global", 1, Duration::from_secs(60));

        limiter.check("user:1", &policy).await.unwrap();
        assert!(limiter.check("user:1", &policy).await.is_err());
        assert!(limiter.check("user:2", &policy).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset() {
        let limiter = limiter(1).await;
        let policy = RateLimitPolicy::new("global", 1, Duration::from_secs(60));

        limiter.check("ip:10.0.0.1", &policy).await.unwrap();
        assert!(limiter.check("ip:10.0.0.1", &policy).await.is_err());

        limiter.reset("ip:10.0.0.1").await.unwrap();
        assert!(limiter.check("ip:10.0.0.1", &policy).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup_drops_expired_keys() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(
            RateLimiter::builder()
                .policy(RateLimitPolicy::new("global", 5, Duration::from_secs(1)))
                .burst(5, Duration::from_secs(1))
                .store(store.clone())
                .cleanup_interval(Some(Duration::from_secs(1)))
                .build()
                .await
                .unwrap(),
        );
        let policy = limiter.config().routing.select("/").unwrap().clone();
        for actor in ["ip:10.0.0.1", "ip:10.0.0.2", "user:3"] {
            limiter.check(actor, &policy).await.unwrap();
        }
        assert_eq!(limiter.burst().len(), 3);
        assert_eq!(store.key_count(), 3);

        let handle = limiter.spawn_cleanup().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(limiter.burst().is_empty());
        assert_eq!(store.key_count(), 0);

        drop(limiter);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_cleanup_can_be_disabled() {
        let limiter = Arc::new(
            RateLimiter::builder()
                .cleanup_interval(None)
                .build()
                .await
                .unwrap(),
        );
        assert!(limiter.spawn_cleanup().is_none());
    }

    #[test]
    fn test_admission_headers() {
        let admission = Admission::Allowed {
            actor: "user:1".into(),
            policy: "global".into(),
            limit: 100,
            remaining: 99,
            reset_after: Duration::from_millis(899_500),
        };
        let headers = admission.headers().unwrap();
        assert_eq!(headers, RateLimitHeaders::allowed(100, 99, 900));
        assert_eq!(admission.actor(), Some("user:1"));

        assert!(Admission::Skipped(SkipReason::ExemptPath).headers().is_none());
        assert_eq!(SkipReason::NoPolicy.to_string(), "no policy for path");
    }
}
