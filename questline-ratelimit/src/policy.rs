//! Quota policies and how paths select them.

use crate::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the policy applied when no route policies are configured.
pub const GLOBAL_POLICY: &str = "global";

/// `points` requests per `duration`, optionally blocking the actor for
/// `block_duration` once exceeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub name: String,
    pub points: u64,
    pub duration: Duration,
    #[serde(default)]
    pub block_duration: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::global()
    }
}

impl RateLimitPolicy {
    pub fn new(name: impl Into<String>, points: u64, duration: Duration) -> Self {
        Self {
            name: name.into(),
            points,
            duration,
            block_duration: Duration::ZERO,
        }
    }

    /// 100 points per 15 minutes.
    pub fn global() -> Self {
        Self::new(GLOBAL_POLICY, 100, Duration::from_secs(900))
    }

    /// Keep rejecting the actor for this long after the quota is exceeded.
    pub fn with_block_duration(mut self, block: Duration) -> Self {
        self.block_duration = block;
        self
    }

    pub fn validate(&self) -> RateLimitResult<()> {
        if self.name.is_empty() {
            return Err(RateLimitError::config("policy name must not be empty"));
        }
        if self.points == 0 {
            return Err(RateLimitError::config(format!(
                "policy '{}' must allow at least one point",
                self.name
            )));
        }
        if self.duration.is_zero() {
            return Err(RateLimitError::config(format!(
                "policy '{}' has a zero-length window",
                self.name
            )));
        }
        Ok(())
    }
}

/// Which policy, if any, applies to a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRouting {
    /// One policy for every path.
    Global(RateLimitPolicy),
    /// Longest matching prefix wins; unmatched paths are not limited.
    ByPrefix(Vec<(String, RateLimitPolicy)>),
}

impl Default for PolicyRouting {
    fn default() -> Self {
        Self::Global(RateLimitPolicy::global())
    }
}

impl PolicyRouting {
    /// Select the policy for `path`.
    ///
    /// ```
    /// use questline_ratelimit::{PolicyRouting, RateLimitPolicy};
    /// use std::time::Duration;
    ///
    /// let routing = PolicyRouting::ByPrefix(vec![
    ///     ("/api".into(), RateLimitPolicy::new("api", 100, Duration::from_secs(60))),
    ///     ("/api/uploads".into(), RateLimitPolicy::new("uploads", 5, Duration::from_secs(60))),
    /// ]);
    ///
    /// assert_eq!(routing.select("/api/uploads/photo").unwrap().name, "uploads");
    /// assert_eq!(routing.select("/api/quests").unwrap().name, "api");
    /// assert!(routing.select("/health").is_none());
    /// ```
    pub fn select(&self, path: &str) -> Option<&RateLimitPolicy> {
        match self {
            Self::Global(policy) => Some(policy),
            Self::ByPrefix(routes) => routes
                .iter()
                .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, policy)| policy),
        }
    }

    /// Every policy this routing can select.
    pub fn policies(&self) -> Vec<&RateLimitPolicy> {
        match self {
            Self::Global(policy) => vec![policy],
            Self::ByPrefix(routes) => routes.iter().map(|(_, policy)| policy).collect(),
        }
    }

    pub fn validate(&self) -> RateLimitResult<()> {
        self.policies().into_iter().try_for_each(RateLimitPolicy::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_defaults() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.name, "global");
        assert_eq!(policy.points, 100);
        assert_eq!(policy.duration, Duration::from_secs(900));
        assert!(policy.block_duration.is_zero());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_global_routing_matches_everything() {
        let routing = PolicyRouting::default();
        assert_eq!(routing.select("/").unwrap().name, "global");
        assert_eq!(routing.select("/anything/else").unwrap().name, "global");
    }

    #[test]
    fn test_longest_prefix_wins_regardless_of_order() {
        let routing = PolicyRouting::ByPrefix(vec![
            (
                "/api/quests/checkin".into(),
                RateLimitPolicy::new("checkin", 3, Duration::from_secs(60)),
            ),
            ("/api/quests".into(), RateLimitPolicy::new("quests", 30, Duration::from_secs(60))),
        ]);
        assert_eq!(routing.select("/api/quests/checkin/9").unwrap().name, "checkin");
        assert_eq!(routing.select("/api/quests/9").unwrap().name, "quests");
        assert!(routing.select("/api/users").is_none());
    }

    #[test]
    fn test_invalid_policies_rejected() {
        assert!(RateLimitPolicy::new("", 1, Duration::from_secs(1)).validate().is_err());
        assert!(RateLimitPolicy::new("p", 0, Duration::from_secs(1)).validate().is_err());
        assert!(RateLimitPolicy::new("p", 1, Duration::ZERO).validate().is_err());

        let routing = PolicyRouting::ByPrefix(vec![(
            "/x".into(),
            RateLimitPolicy::new("x", 0, Duration::from_secs(1)),
        )]);
        assert!(matches!(routing.validate(), Err(RateLimitError::ConfigError(_))));
    }

    #[test]
    fn test_policy_serializes() {
        let policy = RateLimitPolicy::new("login", 5, Duration::from_secs(60))
            .with_block_duration(Duration::from_secs(300));
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["points"], 5);
        let back: RateLimitPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, policy);
    }
}
