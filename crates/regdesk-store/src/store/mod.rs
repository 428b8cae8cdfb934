//! The backend-neutral key/value contract and its two adapters.
//!
//! All session and plan persistence goes through [`KeyValueStore`], so
//! either backend can be swapped without touching the managers built
//! on top. The trait is object-safe and held as
//! `Arc<dyn KeyValueStore>` -- a process-scoped resource acquired once
//! at startup and injected, never ambient global state.

pub mod redis;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{BackendKind, StoreConfig};
use crate::error::Result;

pub use self::redis::RedisStore;
pub use self::sqlite::SqliteStore;

/// Durable key/value store with per-key expiry.
///
/// Values cross the boundary as JSON documents; backends serialize
/// them to JSON text on write and parse on read. A stored value that
/// no longer parses surfaces as [`StoreError::Corruption`], never as a
/// silent miss.
///
/// TTL rule: `ttl_seconds <= 0` means the key never expires; a
/// positive TTL expires the key exactly that many seconds after the
/// write that set it. Every successful write resets the expiry clock.
///
/// [`StoreError::Corruption`]: crate::error::StoreError::Corruption
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Establish the backend connection. Idempotent: connecting an
    /// already-connected store is a no-op. Fails with
    /// [`StoreError::Unavailable`] when the backend cannot be reached
    /// within the configured timeout.
    ///
    /// [`StoreError::Unavailable`]: crate::error::StoreError::Unavailable
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Safe to call multiple times.
    async fn disconnect(&self) -> Result<()>;

    /// Fetch the value stored under `key`. Returns `None` when the key
    /// is absent or has lazily expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, overwriting any prior value and
    /// refreshing the expiry per the TTL rule.
    async fn set(&self, key: &str, value: &Value, ttl_seconds: i64) -> Result<()>;

    /// Remove `key`. Succeeds even when the key does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether a live (non-expired) value exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Currently-live keys matching a glob-style pattern (`*` matches
    /// any run, `?` a single character). Lazily-expired keys are
    /// excluded.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove every key. Destructive; intended for tests and operator
    /// tooling.
    async fn clear_all(&self) -> Result<()>;

    /// Connected/disconnected status. Never errors.
    async fn health_check(&self) -> bool;
}

// Compile-time assertion: KeyValueStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn KeyValueStore) {}
};

/// Build the configured backend, connect it, and hand back the shared
/// process-scoped handle.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        BackendKind::Sqlite => Arc::new(SqliteStore::new(
            &config.sqlite_path,
            config.connect_timeout,
        )),
        BackendKind::Redis => Arc::new(RedisStore::new(
            config.redis_url.clone(),
            config.connect_timeout,
        )),
    };
    store.connect().await?;
    Ok(store)
}
