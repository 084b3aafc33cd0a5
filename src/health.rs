//! Point-in-time health of the layer's dependencies.

use questline_cache::CacheHealth;
use questline_resilience::CircuitState;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rate limiter status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitHealth {
    pub store: &'static str,
    pub enforced: bool,
    /// Requests admitted because the store was unreachable.
    pub degraded_admissions: u64,
}

/// Health snapshot suitable for a `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Breaker state per target seen so far
    pub breakers: BTreeMap<String, CircuitState>,
    pub cache: CacheHealth,
    pub rate_limit: RateLimitHealth,
}

impl HealthReport {
    /// Targets whose breaker is currently open.
    pub fn open_circuits(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|(_, state)| **state == CircuitState::Open)
            .map(|(target, _)| target.as_str())
            .collect()
    }

    /// Whether every dependency is currently usable.
    pub fn is_healthy(&self) -> bool {
        self.cache.is_available() && self.open_circuits().is_empty()
    }
}
