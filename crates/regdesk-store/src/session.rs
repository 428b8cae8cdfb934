//! Session lifecycle over the key/value contract.
//!
//! Sessions live under `session:<id>` keys with the configured TTL.
//! Expiry is sliding on writes only: creation and update reset the
//! clock, reads do not.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::Session;
use crate::store::KeyValueStore;

const KEY_PREFIX: &str = "session:";

fn session_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Creates, reads, updates, and deletes session records.
///
/// Holds no state beyond the injected store handle and the TTL, so it
/// is safe to call concurrently without extra locking.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    ttl_seconds: i64,
}

impl SessionManager {
    /// Build a manager over `store` with the given session TTL in
    /// seconds (`<= 0` means sessions never expire).
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Create a session with a fresh 128-bit random id and store it
    /// under the configured TTL.
    pub async fn create(&self, initial_data: serde_json::Map<String, Value>) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let session = Session {
            id: id.clone(),
            data: initial_data,
            created_at: now,
            updated_at: now,
            expires_at: self.expiry_from_now(),
        };

        self.put(&session).await?;
        Ok(session)
    }

    /// Fetch a session. Absent and expired sessions are
    /// indistinguishable: both are [`StoreError::SessionNotFound`].
    pub async fn get(&self, id: &str) -> Result<Session> {
        let key = session_key(id);
        match self.store.get(&key).await? {
            None => Err(StoreError::SessionNotFound(id.to_string())),
            Some(value) => decode(&key, value),
        }
    }

    /// Replace a session's `data` wholesale, bump `updated_at`, and
    /// reset the expiry clock.
    pub async fn update(&self, id: &str, data: serde_json::Map<String, Value>) -> Result<Session> {
        let mut session = self.get(id).await?;

        session.data = data;
        session.updated_at = Utc::now();
        session.expires_at = self.expiry_from_now();

        self.put(&session).await?;
        Ok(session)
    }

    /// Delete a session. Idempotent: deleting an absent id is not an
    /// error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&session_key(id)).await
    }

    /// Whether a live session exists under `id`.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.store.exists(&session_key(id)).await
    }

    /// Enumerate all live sessions, optionally narrowed to ids
    /// starting with `id_prefix`. There is no querying on `data`
    /// fields.
    pub async fn list(&self, id_prefix: Option<&str>) -> Result<Vec<Session>> {
        let pattern = format!("{KEY_PREFIX}{}*", id_prefix.unwrap_or(""));
        let keys = self.store.keys_matching(&pattern).await?;

        let mut sessions = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between the scan and this read; that is
            // an ordinary miss, not an error.
            if let Some(value) = self.store.get(&key).await? {
                sessions.push(decode(&key, value)?);
            }
        }
        Ok(sessions)
    }

    fn expiry_from_now(&self) -> Option<chrono::DateTime<Utc>> {
        if self.ttl_seconds <= 0 {
            return None;
        }
        Some(Utc::now() + ChronoDuration::seconds(self.ttl_seconds))
    }

    async fn put(&self, session: &Session) -> Result<()> {
        let key = session_key(&session.id);
        let value = serde_json::to_value(session)
            .map_err(|e| StoreError::backend("serialize", key.as_str(), e))?;
        self.store.set(&key, &value, self.ttl_seconds).await
    }
}

fn decode(key: &str, value: Value) -> Result<Session> {
    serde_json::from_value(value).map_err(|e| StoreError::corruption(key, e))
}
