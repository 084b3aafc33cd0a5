//! # Questline HTTP Client
//!
//! Outbound HTTP with a circuit breaker and retry policy per remote target.
//!
//! ## Features
//!
//! - **Per-target isolation**: absolute URLs share a breaker per origin,
//!   service calls per `service:{name}`
//! - **Retry with backoff**: transport failures, timeouts and 5xx responses
//!   are retried with exponential backoff and jitter
//! - **Client errors pass through**: 4xx responses are returned, not retried
//! - **Service registry**: call downstream services by logical name
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use questline_http_client::{HttpClient, HttpClientConfig, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?
//!         .with_services(ServiceRegistry::new().register("profiles", "http://profiles:8080"));
//!
//!     let response = client.get("https://api.example.com/users").send().await?;
//!     println!("Status: {}", response.status());
//!
//!     let friends = client
//!         .service("profiles")
//!         .get("/users/42/friends")
//!         .send()
//!         .await?;
//!     println!("Friends: {}", friends.text()?);
//!
//!     println!("Breakers: {:?}", client.breaker_states());
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod request;
mod response;
mod services;

pub use client::HttpClient;
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use error::{HttpClientError, RequestError, Result};
pub use request::{Address, HttpRequest, RequestBuilder, ServiceRequests};
pub use response::Response;
pub use services::{ServiceRegistry, service_target};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use questline_resilience::{
    CircuitBreakerConfig, CircuitState, DegradationPolicy, PipelineConfig, RetryPolicy,
};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use questline_http_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::HttpClient;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{HttpClientError, RequestError, Result};
    pub use crate::request::{HttpRequest, RequestBuilder};
    pub use crate::response::Response;
    pub use crate::services::ServiceRegistry;
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
    pub use questline_resilience::{CircuitBreakerConfig, CircuitState, RetryPolicy};
}
