//! # Questline Cache
//!
//! A cache client that treats the cache as optional. When the backend is
//! down, reads are misses and writes are skipped; callers never see an error.
//!
//! ## Backends
//!
//! - **Redis** (`redis` feature, on by default): connects at startup with
//!   backoff, reconnects in the background
//! - **In-memory**: DashMap with TTLs, for development and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use questline_cache::{CacheClient, CacheConfig, RedisCache, RedisConnectConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), questline_cache::CacheError> {
//!     let redis = RedisCache::connect(RedisConnectConfig::new("redis://localhost:6379")).await?;
//!     let cache = CacheClient::new(Arc::new(redis), CacheConfig::new().with_key_prefix("questline"));
//!
//!     cache.set("leaderboard:weekly", &vec![("ana", 120), ("bo", 95)], 300).await;
//!     let board: Option<Vec<(String, u32)>> = cache.get("leaderboard:weekly").await;
//!     println!("{board:?}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod traits;

pub use client::{CacheClient, CacheHealth};
pub use config::{CacheConfig, DEFAULT_TARGET, RedisConnectConfig};
pub use connection::{ConnectionMonitor, ConnectionState};
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use traits::CacheStore;
