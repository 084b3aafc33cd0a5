//! Backend connection state, tracked apart from breaker state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{info, warn};

/// Whether the cache backend is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Lock-free connection state holder.
#[derive(Debug)]
pub struct ConnectionMonitor {
    state: AtomicU8,
    name: &'static str,
}

const CONNECTED: u8 = 0;
const DISCONNECTED: u8 = 1;

impl ConnectionMonitor {
    pub fn new(name: &'static str, initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(encode(initial)),
            name,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Record a state, logging only actual changes.
    pub fn set(&self, state: ConnectionState) {
        let previous = self.state.swap(encode(state), Ordering::AcqRel);
        if previous == encode(state) {
            return;
        }
        match state {
            ConnectionState::Connected => info!(backend = self.name, "Cache backend connected"),
            ConnectionState::Disconnected => {
                warn!(backend = self.name, "Cache backend disconnected")
            }
        }
    }
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connected => CONNECTED,
        ConnectionState::Disconnected => DISCONNECTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let monitor = ConnectionMonitor::new("test", ConnectionState::Disconnected);
        assert!(!monitor.is_connected());
        monitor.set(ConnectionState::Connected);
        assert_eq!(monitor.state(), ConnectionState::Connected);
        monitor.set(ConnectionState::Connected);
        monitor.set(ConnectionState::Disconnected);
        assert_eq!(monitor.state().to_string(), "disconnected");
    }
}
