//! Cache backend trait.

use crate::connection::ConnectionState;
use crate::error::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// A shared key-value backend.
///
/// Keys arrive fully prefixed. Values are JSON strings.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a raw value. `Ok(None)` means the key is absent.
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a raw value with a time-to-live. A zero TTL deletes the key.
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
