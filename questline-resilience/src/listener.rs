//! Observers for circuit breaker state transitions.

use crate::breaker::CircuitState;
use tokio::time::Instant;
use tracing::{info, warn};

/// A single state change of one target's breaker.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Target identity the breaker protects.
    pub target: String,
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
    /// When the change happened.
    pub at: Instant,
}

/// Receives breaker transitions.
///
/// Listeners run on the task that caused the transition, after the breaker
/// has released its lock. Keep them cheap.
pub trait StateListener: Send + Sync {
    fn on_transition(&self, transition: &StateTransition);
}

impl<F> StateListener for F
where
    F: Fn(&StateTransition) + Send + Sync,
{
    fn on_transition(&self, transition: &StateTransition) {
        self(transition)
    }
}

/// Logs every transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl StateListener for TracingListener {
    fn on_transition(&self, transition: &StateTransition) {
        match transition.to {
            CircuitState::Open => warn!(
                target_id = %transition.target,
                from = %transition.from,
                "Circuit breaker OPENED"
            ),
            CircuitState::HalfOpen => info!(
                target_id = %transition.target,
                "Circuit breaker HALF-OPEN, probing target"
            ),
            CircuitState::Closed => info!(
                target_id = %transition.target,
                from = %transition.from,
                "Circuit breaker CLOSED"
            ),
        }
    }
}
