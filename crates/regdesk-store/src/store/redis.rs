//! Networked backend.
//!
//! Delegates expiry to Redis's native per-key TTL: a positive TTL maps
//! to `SETEX`, a non-positive one to a plain `SET` (no expiry). Key
//! scans use incremental `SCAN` with a `MATCH` pattern, so only live
//! keys are ever returned.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::KeyValueStore;
use crate::error::{Result, StoreError};

/// Redis-backed [`KeyValueStore`].
pub struct RedisStore {
    url: String,
    connect_timeout: Duration,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    /// Create an unconnected store for the server at `url`.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            manager: RwLock::new(None),
        }
    }

    /// The connection URL this store talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Clone the live connection handle out of the lock, or fail the
    /// named operation when the store is not connected.
    async fn connection(&self, op: &'static str, key: &str) -> Result<ConnectionManager> {
        self.manager
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::backend(op, key, "store not connected"))
    }

    async fn open_manager(&self) -> Result<ConnectionManager> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| StoreError::Unavailable(format!("invalid redis URL {}: {e}", self.url)))?;

        let mut manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to {}: {e}", self.url)))?;

        // Verify the server actually answers before handing the
        // connection out.
        let _: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .map_err(|e| StoreError::Unavailable(format!("redis at {} did not answer: {e}", self.url)))?;

        Ok(manager)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.manager.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let manager = tokio::time::timeout(self.connect_timeout, self.open_manager())
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!("timed out connecting to {}", self.url))
            })??;

        info!(url = %self.url, "connected to networked store");
        *guard = Some(manager);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.manager.write().await;
        if guard.take().is_some() {
            debug!(url = %self.url, "disconnected from networked store");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut con = self.connection("get", key).await?;
        let text: Option<String> = con
            .get(key)
            .await
            .map_err(|e| StoreError::backend("get", key, e))?;

        match text {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::corruption(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl_seconds: i64) -> Result<()> {
        let mut con = self.connection("set", key).await?;
        let text = value.to_string();

        if ttl_seconds > 0 {
            let _: () = con
                .set_ex(key, text, ttl_seconds as u64)
                .await
                .map_err(|e| StoreError::backend("set", key, e))?;
        } else {
            let _: () = con
                .set(key, text)
                .await
                .map_err(|e| StoreError::backend("set", key, e))?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.connection("delete", key).await?;
        let _: () = con
            .del(key)
            .await
            .map_err(|e| StoreError::backend("delete", key, e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut con = self.connection("exists", key).await?;
        let present: bool = con
            .exists(key)
            .await
            .map_err(|e| StoreError::backend("exists", key, e))?;
        Ok(present)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut con = self.connection("keys_matching", pattern).await?;
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = con
                .scan_match(pattern)
                .await
                .map_err(|e| StoreError::backend("keys_matching", pattern, e))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        let mut con = self.connection("clear_all", "*").await?;
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut con)
            .await
            .map_err(|e| StoreError::backend("clear_all", "*", e))?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let Some(mut con) = self.manager.read().await.clone() else {
            return false;
        };
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut con).await;
        pong.is_ok()
    }
}
