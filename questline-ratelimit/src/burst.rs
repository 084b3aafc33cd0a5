//! Process-local burst limiter.
//!
//! A fixed window per actor kept in a `DashMap`. Counters live in this
//! process only; each instance smooths its own traffic.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Window state for a key
#[derive(Debug, Clone)]
struct WindowState {
    /// Request count in current window
    count: u64,
    /// Window start time
    window_start: Instant,
}

/// Outcome of a burst check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstCheck {
    pub allowed: bool,
    pub remaining: u64,
    /// Time until the current window resets
    pub reset_after: Duration,
}

/// Fixed window burst limiter
#[derive(Debug)]
pub struct BurstLimiter {
    points: u64,
    window: Duration,
    windows: DashMap<String, WindowState>,
}

impl Default for BurstLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

impl BurstLimiter {
    /// Create a burst limiter allowing `points` requests per `window`.
    ///
    /// Zero points or a zero window disables it.
    pub fn new(points: u64, window: Duration) -> Self {
        Self {
            points,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.points > 0 && !self.window.is_zero()
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to record a request
    pub fn try_acquire(&self, key: &str) -> BurstCheck {
        if !self.is_enabled() {
            return BurstCheck {
                allowed: true,
                remaining: u64::MAX,
                reset_after: Duration::ZERO,
            };
        }

        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState {
                count: 0,
                window_start: now,
            });

        // Check if we're in a new window
        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        let reset_after = self.window - now.duration_since(entry.window_start);

        if entry.count < self.points {
            entry.count += 1;
            BurstCheck {
                allowed: true,
                remaining: self.points - entry.count,
                reset_after,
            }
        } else {
            BurstCheck {
                allowed: false,
                remaining: 0,
                reset_after,
            }
        }
    }

    /// Forget the window for a key
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Drop windows that have already ended.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, state| now.duration_since(state.window_start) < self.window);
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_basic() {
        let limiter = BurstLimiter::new(3, Duration::from_secs(1));

        for remaining in (0..3).rev() {
            let check = limiter.try_acquire("ip:10.0.0.1");
            assert!(check.allowed);
            assert_eq!(check.remaining, remaining);
        }

        let denied = limiter.try_acquire("ip:10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_secs(1));

        // Other actors are unaffected
        assert!(limiter.try_acquire("ip:10.0.0.2").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = BurstLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.try_acquire("k").allowed);

        tokio::time::advance(Duration::from_millis(400)).await;
        let denied = limiter.try_acquire("k");
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_millis(600));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.try_acquire("k").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_and_reset() {
        let limiter = BurstLimiter::new(1, Duration::from_secs(1));
        limiter.try_acquire("a");
        limiter.try_acquire("b");
        assert_eq!(limiter.len(), 2);

        limiter.reset("a");
        assert!(limiter.try_acquire("a").allowed);

        tokio::time::advance(Duration::from_secs(2)).await;
        limiter.cleanup();
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_disabled() {
        let limiter = BurstLimiter::new(0, Duration::from_secs(1));
        assert!(!limiter.is_enabled());
        for _ in 0..100 {
            assert!(limiter.try_acquire("k").allowed);
        }
        assert!(limiter.is_empty());
    }
}
