//! What to do when a protecting dependency cannot give an answer.

use serde::{Deserialize, Serialize};

/// Degradation policy shared by the pipeline (open circuit) and the rate
/// limiter (unreachable counter store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradationPolicy {
    /// Let the request through and log a warning.
    FailOpen,
    /// Reject the request.
    FailClosed,
}

impl DegradationPolicy {
    pub fn allows(&self) -> bool {
        matches!(self, DegradationPolicy::FailOpen)
    }
}

impl std::fmt::Display for DegradationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailOpen => f.write_str("fail-open"),
            Self::FailClosed => f.write_str("fail-closed"),
        }
    }
}
