//! Resilience primitives for Questline outbound calls.
//!
//! - [`CircuitBreaker`] - rolling-window breaker with half-open probing
//! - [`RetryPolicy`] - exponential backoff with jitter
//! - [`Pipeline`] - breaker, time budget and retries around one call
//! - [`PipelineRegistry`] - one memoized pipeline per remote target
//! - [`DegradationPolicy`] - fail-open or fail-closed behaviour
//!
//! ## Example
//!
//! ```rust
//! use questline_resilience::{Classify, PipelineConfig, PipelineRegistry};
//!
//! #[derive(Debug)]
//! struct Unavailable;
//!
//! impl std::fmt::Display for Unavailable {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("unavailable")
//!     }
//! }
//!
//! impl Classify for Unavailable {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = PipelineRegistry::new(PipelineConfig::default());
//! let pipeline = registry.pipeline("profiles");
//! let score = pipeline
//!     .execute(|| async { Ok::<_, Unavailable>(42) })
//!     .await
//!     .unwrap();
//! assert_eq!(score, 42);
//! # });
//! ```

pub mod breaker;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod retry;

pub use breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use error::ResilienceError;
pub use listener::{StateListener, StateTransition, TracingListener};
pub use pipeline::{Pipeline, PipelineConfig};
pub use policy::DegradationPolicy;
pub use registry::PipelineRegistry;
pub use retry::{Classify, RetryPolicy};
