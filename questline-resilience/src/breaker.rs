//! Circuit breaker with a rolling, time-bucketed failure window.
//!
//! ## States
//!
//! - **Closed**: calls pass through; each outcome lands in the rolling window.
//!   Once the window holds at least `minimum_calls` samples and the failure
//!   percentage exceeds `failure_rate_threshold`, the breaker opens.
//! - **Open**: calls are rejected without touching the target. After
//!   `reset_timeout` the next admission moves the breaker to half-open.
//! - **Half-Open**: up to `half_open_max_calls` trial calls run concurrently.
//!   `success_threshold` successes close the breaker, any failure reopens it.
//!
//! ## Example
//!
//! ```rust
//! use questline_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! let breaker = CircuitBreaker::new("https://api.example.com", CircuitBreakerConfig::default());
//! if let Some(permit) = breaker.try_acquire() {
//!     // ... perform the call ...
//!     permit.record_success();
//! }
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

use crate::listener::{StateListener, StateTransition};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// Trial calls probe the target.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) that must be exceeded to open.
    pub failure_rate_threshold: f64,
    /// Samples required in the window before the rate is evaluated.
    pub minimum_calls: u32,
    /// Time spent open before trial calls are admitted.
    pub reset_timeout: Duration,
    /// Length of the rolling window.
    pub window: Duration,
    /// Number of buckets the window is split into.
    pub window_buckets: u32,
    /// Concurrent trial calls allowed while half-open.
    pub half_open_max_calls: u32,
    /// Trial successes needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_calls: 5,
            reset_timeout: Duration::from_secs(30),
            window: Duration::from_secs(10),
            window_buckets: 10,
            half_open_max_calls: 1,
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure percentage threshold.
    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.failure_rate_threshold = percent;
        self
    }

    /// Set the minimum number of samples before tripping.
    pub fn minimum_calls(mut self, calls: u32) -> Self {
        self.minimum_calls = calls;
        self
    }

    /// Set the open-state cool-down.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the rolling window length and bucket count.
    pub fn window(mut self, window: Duration, buckets: u32) -> Self {
        self.window = window;
        self.window_buckets = buckets;
        self
    }

    /// Set the number of concurrent trial calls while half-open.
    pub fn half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    /// Set the trial successes needed to close.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    fn bucket_width(&self) -> Duration {
        let buckets = self.window_buckets.max(1);
        (self.window / buckets).max(Duration::from_millis(1))
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started: Instant,
    successes: u32,
    failures: u32,
}

#[derive(Debug)]
struct RollingWindow {
    span: Duration,
    width: Duration,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            span: config.window,
            width: config.bucket_width(),
            buckets: VecDeque::with_capacity(config.window_buckets as usize),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started) >= self.span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.evict(now);
        let stale = match self.buckets.back() {
            Some(bucket) => now.duration_since(bucket.started) >= self.width,
            None => true,
        };
        if stale {
            self.buckets.push_back(Bucket {
                started: now,
                successes: 0,
                failures: 0,
            });
        }
        if let Some(current) = self.buckets.back_mut() {
            if success {
                current.successes += 1;
            } else {
                current.failures += 1;
            }
        }
    }

    fn totals(&mut self, now: Instant) -> (u32, u32) {
        self.evict(now);
        self.buckets
            .iter()
            .fold((0, 0), |(s, f), b| (s + b.successes, f + b.failures))
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
    window: RollingWindow,
    trials_in_flight: u32,
    trial_successes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Closed,
    Trial,
    Bypass,
}

/// Admission ticket for one call.
///
/// Settle it with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping a trial permit unsettled
/// frees its half-open slot without counting an outcome.
#[must_use = "a permit must be settled with record_success or record_failure"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is a half-open probe.
    pub fn is_trial(&self) -> bool {
        self.kind == PermitKind::Trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.settle(self.kind, true);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.kind, false);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.kind == PermitKind::Trial {
            self.breaker.release_trial();
        }
    }
}

/// Circuit breaker for one remote target.
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listeners: Vec<Arc<dyn StateListener>>,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker for a target.
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_listeners(target, config, Vec::new())
    }

    /// Create a breaker that reports transitions to `listeners`.
    pub fn with_listeners(
        target: impl Into<String>,
        config: CircuitBreakerConfig,
        listeners: Vec<Arc<dyn StateListener>>,
    ) -> Self {
        let target = target.into();
        debug!(
            target_id = %target,
            failure_rate_threshold = config.failure_rate_threshold,
            minimum_calls = config.minimum_calls,
            reset_timeout = ?config.reset_timeout,
            "Circuit breaker initialized"
        );

        let window = RollingWindow::new(&config);
        Self {
            target,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
                window,
                trials_in_flight: 0,
                trial_successes: 0,
            }),
            listeners,
            total_requests: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Target identity this breaker protects.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, moving open to half-open once the cool-down elapsed.
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.maybe_half_open(&mut inner, Instant::now());
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Ask to run one call. `None` means the call must not reach the target.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let (kind, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.maybe_half_open(&mut inner, Instant::now());
            let kind = match inner.state {
                CircuitState::Closed => Some(PermitKind::Closed),
                CircuitState::Open => None,
                CircuitState::HalfOpen => {
                    if inner.trials_in_flight < self.config.half_open_max_calls {
                        inner.trials_in_flight += 1;
                        Some(PermitKind::Trial)
                    } else {
                        None
                    }
                }
            };
            (kind, transition)
        };
        self.notify(transition);

        match kind {
            Some(kind) => Some(CallPermit {
                breaker: self,
                kind,
                settled: false,
            }),
            None => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Permit for a call let through despite an open breaker. Its outcome
    /// counts toward the totals only.
    pub fn bypass_permit(&self) -> CallPermit<'_> {
        CallPermit {
            breaker: self,
            kind: PermitKind::Bypass,
            settled: false,
        }
    }

    /// Record a success outside the permit flow.
    pub fn record_success(&self) {
        self.settle(PermitKind::Closed, true);
    }

    /// Record a failure outside the permit flow.
    pub fn record_failure(&self) {
        self.settle(PermitKind::Closed, false);
    }

    /// Manually open the breaker.
    pub fn force_open(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, CircuitState::Open, Instant::now())
        };
        self.notify(transition);
    }

    /// Manually close the breaker and clear its window.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let transition = self.transition(&mut inner, CircuitState::Closed, Instant::now());
            inner.window.clear();
            transition
        };
        self.notify(transition);
    }

    fn settle(&self, kind: PermitKind, success: bool) {
        if success {
            self.total_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }
        if kind == PermitKind::Bypass {
            return;
        }

        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock();
            match (inner.state, kind) {
                (CircuitState::HalfOpen, PermitKind::Trial) => {
                    inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                    if success {
                        inner.trial_successes += 1;
                        if inner.trial_successes >= self.config.success_threshold {
                            self.transition(&mut inner, CircuitState::Closed, now)
                        } else {
                            None
                        }
                    } else {
                        self.transition(&mut inner, CircuitState::Open, now)
                    }
                }
                (CircuitState::Closed, _) => {
                    inner.window.record(now, success);
                    if !success && self.should_trip(&mut inner.window, now) {
                        self.transition(&mut inner, CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                // Late results from calls admitted before the last transition.
                _ => None,
            }
        };
        self.notify(transition);
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn should_trip(&self, window: &mut RollingWindow, now: Instant) -> bool {
        let (successes, failures) = window.totals(now);
        let total = successes + failures;
        if total == 0 || total < self.config.minimum_calls {
            return false;
        }
        let failure_rate = f64::from(failures) * 100.0 / f64::from(total);
        failure_rate > self.config.failure_rate_threshold
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner, now: Instant) -> Option<StateTransition> {
        if inner.state != CircuitState::Open {
            return None;
        }
        match inner.opened_at {
            Some(opened_at) if now.duration_since(opened_at) >= self.config.reset_timeout => {
                self.transition(inner, CircuitState::HalfOpen, now)
            }
            _ => None,
        }
    }

    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
        now: Instant,
    ) -> Option<StateTransition> {
        let from = inner.state;
        if from == to {
            return None;
        }

        inner.state = to;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(now),
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
            }
        }

        debug!(target_id = %self.target, %from, %to, "Circuit breaker transition");
        Some(StateTransition {
            target: self.target.clone(),
            from,
            to,
            at: now,
        })
    }

    fn notify(&self, transition: Option<StateTransition>) {
        if let Some(transition) = transition {
            for listener in &self.listeners {
                listener.on_transition(&transition);
            }
        }
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.state();
        let (window_successes, window_failures) = self.inner.lock().window.totals(Instant::now());
        CircuitBreakerStats {
            target: self.target.clone(),
            state,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            window_successes,
            window_failures,
        }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub target: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    /// Successes currently in the rolling window.
    pub window_successes: u32,
    /// Failures currently in the rolling window.
    pub window_failures: u32,
}

impl CircuitBreakerStats {
    /// Failure rate of the rolling window (0.0 - 1.0).
    pub fn window_failure_rate(&self) -> f64 {
        let total = self.window_successes + self.window_failures;
        if total == 0 {
            0.0
        } else {
            f64::from(self.window_failures) / f64::from(total)
        }
    }
}
