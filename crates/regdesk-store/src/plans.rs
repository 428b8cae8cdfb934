//! Versioned plan storage over the key/value contract.
//!
//! A plan record lives under `plan:<id>` as one JSON document holding
//! the full version history. The record is the unit of storage:
//! refinements rewrite the whole record in a single `set`, so a reader
//! never observes `current_version = N` without version N's payload.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::models::{PlanRecord, PlanSummary, PlanVersion};
use crate::store::KeyValueStore;

const KEY_PREFIX: &str = "plan:";

fn plan_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Stores plan records and their append-only version history.
///
/// Holds no state beyond the injected store handle and the TTL, so it
/// is safe to call concurrently without extra locking. Two concurrent
/// refinements of the *same* plan id can still race: both may read
/// `current_version = N` and both write `N + 1`, and the backend keeps
/// the last writer. Callers that need stronger guarantees serialize
/// refinements per plan id.
pub struct PlanRepository {
    store: Arc<dyn KeyValueStore>,
    ttl_seconds: i64,
}

impl PlanRepository {
    /// Build a repository over `store` with the given plan TTL in
    /// seconds (`<= 0` means plan records never expire).
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Create a brand-new plan record with version 1.
    ///
    /// Fails with [`StoreError::PlanExists`] when a record with this
    /// id is already present; refinements go through
    /// [`Self::append_version`].
    pub async fn save_new(
        &self,
        id: &str,
        payload: Value,
        session_id: Option<&str>,
    ) -> Result<PlanRecord> {
        let key = plan_key(id);
        if self.store.get(&key).await?.is_some() {
            return Err(StoreError::PlanExists(id.to_string()));
        }

        let now = Utc::now();
        let record = PlanRecord {
            id: id.to_string(),
            session_id: session_id.map(str::to_string),
            current_version: 1,
            versions: vec![PlanVersion {
                version: 1,
                payload,
                modifications: None,
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        };

        self.put(&record).await?;
        Ok(record)
    }

    /// Append a refined version to an existing record.
    ///
    /// Computes `current_version + 1`, appends the entry, and persists
    /// the whole record back, resetting the plan TTL.
    pub async fn append_version(
        &self,
        id: &str,
        payload: Value,
        modifications: impl Into<String>,
    ) -> Result<PlanRecord> {
        let mut record = self.get_record(id).await?;

        let now = Utc::now();
        let new_version = record.current_version + 1;
        record.versions.push(PlanVersion {
            version: new_version,
            payload,
            modifications: Some(modifications.into()),
            created_at: now,
        });
        record.current_version = new_version;
        record.updated_at = now;

        self.put(&record).await?;
        Ok(record)
    }

    /// Fetch one version of a plan: the current one when `version` is
    /// `None`, otherwise exactly the requested entry.
    ///
    /// Fails with [`StoreError::PlanNotFound`] when the record is
    /// absent and [`StoreError::VersionNotFound`] when the record
    /// exists but the number is out of range.
    pub async fn get(&self, id: &str, version: Option<u32>) -> Result<PlanVersion> {
        let record = self.get_record(id).await?;
        let wanted = version.unwrap_or(record.current_version);

        record
            .version(wanted)
            .cloned()
            .ok_or(StoreError::VersionNotFound {
                plan_id: id.to_string(),
                version: wanted,
            })
    }

    /// Fetch the full record including every version, for history
    /// display.
    pub async fn get_record(&self, id: &str) -> Result<PlanRecord> {
        let key = plan_key(id);
        match self.store.get(&key).await? {
            None => Err(StoreError::PlanNotFound(id.to_string())),
            Some(value) => decode(&key, value),
        }
    }

    /// Enumerate all live plan records as summaries, optionally
    /// narrowed to those associated with `session_id`.
    pub async fn list(&self, session_id: Option<&str>) -> Result<Vec<PlanSummary>> {
        let keys = self.store.keys_matching(&format!("{KEY_PREFIX}*")).await?;

        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between the scan and this read; that is
            // an ordinary miss, not an error.
            let Some(value) = self.store.get(&key).await? else {
                continue;
            };
            let record = decode(&key, value)?;
            if session_id.is_none() || record.session_id.as_deref() == session_id {
                summaries.push(record.summarize());
            }
        }
        Ok(summaries)
    }

    /// Delete a record and all its versions. Idempotent: deleting an
    /// absent id is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&plan_key(id)).await
    }

    /// Whether a live plan record exists under `id`.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.store.exists(&plan_key(id)).await
    }

    async fn put(&self, record: &PlanRecord) -> Result<()> {
        let key = plan_key(&record.id);
        let value = serde_json::to_value(record)
            .map_err(|e| StoreError::backend("serialize", key.as_str(), e))?;
        self.store.set(&key, &value, self.ttl_seconds).await
    }
}

fn decode(key: &str, value: Value) -> Result<PlanRecord> {
    serde_json::from_value(value).map_err(|e| StoreError::corruption(key, e))
}
