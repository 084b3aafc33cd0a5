//! Inbound admission control.
//!
//! [`RateLimitGuard`] runs the checks a route handler needs before doing any
//! work: automated clients first, then exemptions, then the actor's quotas.

use crate::error::{RateLimitError, RateLimitResult};
use crate::extractor::{KeyExtractor, RequestInfo};
use crate::{Admission, RateLimiter, SkipReason};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Admission guard for inbound requests
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    /// The rate limiter instance
    limiter: Arc<RateLimiter>,
    /// Key extraction strategy
    key_extractor: KeyExtractor,
}

impl RateLimitGuard {
    /// Create a guard using the limiter's configured key extractor
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let key_extractor = limiter.config().key_extractor.clone();
        Self {
            limiter,
            key_extractor,
        }
    }

    /// Create guard with a custom key extractor
    pub fn with_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.key_extractor = extractor;
        self
    }

    /// Get the underlying rate limiter
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decide whether a request may proceed.
    ///
    /// `Ok` always means proceed; the [`Admission`] says why. Rejections
    /// carry their HTTP status via [`RateLimitError::status_code`].
    pub async fn admit(&self, info: &RequestInfo) -> RateLimitResult<Admission> {
        let config = self.limiter.config();

        if let Some(user_agent) = info.user_agent()
            && config.is_bot(user_agent)
        {
            info!(user_agent = %user_agent, path = %info.path, "Rejecting automated client");
            return Err(RateLimitError::BotRejected {
                user_agent: user_agent.to_string(),
            });
        }

        if !config.enforce {
            trace!(path = %info.path, "Rate limiting not enforced");
            return Ok(Admission::Skipped(SkipReason::NotEnforced));
        }

        if config.is_exempt(&info.path) {
            trace!(path = %info.path, "Path is exempt from rate limiting");
            return Ok(Admission::Skipped(SkipReason::ExemptPath));
        }

        let Some(policy) = config.routing.select(&info.path) else {
            trace!(path = %info.path, "No rate limit policy for path");
            return Ok(Admission::Skipped(SkipReason::NoPolicy));
        };

        let Some(actor) = self.key_extractor.extract(info) else {
            debug!(
                path = %info.path,
                extractor = self.key_extractor.description(),
                "Could not extract rate limit key, allowing request"
            );
            return Ok(Admission::Skipped(SkipReason::NoActor));
        };

        self.limiter.check(&actor, policy).await
    }
}
