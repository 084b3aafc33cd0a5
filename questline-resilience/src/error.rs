//! Errors produced by a protected call.

use std::time::Duration;
use thiserror::Error;

/// Outcome of a failed pipeline call, generic over the action's error.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The target's breaker is open; the action was not invoked.
    #[error("circuit open for {target}")]
    CircuitOpen { target: String },

    /// Every attempt failed with a retryable error.
    #[error("{target}: retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// The action failed with an error that is not worth retrying.
    #[error("{target}: {source}")]
    NonRetryable {
        target: String,
        #[source]
        source: E,
    },

    /// The whole protected call exceeded its time budget.
    #[error("{target}: call timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

impl<E> ResilienceError<E> {
    /// Target identity the call was made against.
    pub fn target(&self) -> &str {
        match self {
            Self::CircuitOpen { target }
            | Self::RetriesExhausted { target, .. }
            | Self::NonRetryable { target, .. }
            | Self::Timeout { target, .. } => target,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// The action's last error, if the action ran at all.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::NonRetryable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Consume the error, returning the action's last error.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::NonRetryable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Map the action's error type.
    pub fn map_err<F, O>(self, f: O) -> ResilienceError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::CircuitOpen { target } => ResilienceError::CircuitOpen { target },
            Self::RetriesExhausted {
                target,
                attempts,
                source,
            } => ResilienceError::RetriesExhausted {
                target,
                attempts,
                source: f(source),
            },
            Self::NonRetryable { target, source } => ResilienceError::NonRetryable {
                target,
                source: f(source),
            },
            Self::Timeout { target, timeout } => ResilienceError::Timeout { target, timeout },
        }
    }
}
