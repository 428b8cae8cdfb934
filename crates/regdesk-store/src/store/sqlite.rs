//! Embedded single-file backend.
//!
//! One SQLite file holds a `storage(key, value, expires_at)` table.
//! Expiry is enforced by filtering on `expires_at` in every read and
//! every key scan; physically deleting expired rows is a sweep that
//! only reclaims space. "Expired but not yet purged" is a valid
//! physical state that is never observable through the contract.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::KeyValueStore;
use crate::error::{Result, StoreError};

/// Migrations embedded at compile time from
/// `crates/regdesk-store/migrations/`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// SQLite-backed [`KeyValueStore`].
pub struct SqliteStore {
    path: PathBuf,
    connect_timeout: Duration,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteStore {
    /// Create an unconnected store for the database file at `path`.
    pub fn new(path: impl AsRef<Path>, connect_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    /// The database file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone the live pool out of the lock, or fail the named
    /// operation when the store is not connected.
    async fn pool(&self, op: &'static str, key: &str) -> Result<SqlitePool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::backend(op, key, "store not connected"))
    }

    async fn open_pool(&self) -> Result<SqlitePool> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(self.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!(
                    "failed to open database at {}: {e}",
                    self.path.display()
                ))
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to run migrations: {e}")))?;

        Ok(pool)
    }

    /// Physically delete expired rows. Correctness never depends on
    /// this; reads filter expired rows regardless. Returns the number
    /// of rows reclaimed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let pool = self.pool("purge_expired", "*").await?;
        let result = sqlx::query("DELETE FROM storage WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .bind(now_millis())
            .execute(&pool)
            .await
            .map_err(|e| StoreError::backend("purge_expired", "*", e))?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "reclaimed expired rows");
        }
        Ok(purged)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let pool = tokio::time::timeout(self.connect_timeout, self.open_pool())
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "timed out opening database at {}",
                    self.path.display()
                ))
            })??;

        info!(path = %self.path.display(), "connected to embedded store");
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.pool.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            debug!(path = %self.path.display(), "disconnected from embedded store");
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let pool = self.pool("get", key).await?;
        let row: Option<String> = sqlx::query_scalar(
            "SELECT value FROM storage \
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&pool)
        .await
        .map_err(|e| StoreError::backend("get", key, e))?;

        match row {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::corruption(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl_seconds: i64) -> Result<()> {
        let pool = self.pool("set", key).await?;
        let expires_at = expiry_millis(ttl_seconds);
        let text = value.to_string();

        sqlx::query(
            "INSERT INTO storage (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET \
                 value = excluded.value, \
                 expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(&text)
        .bind(expires_at)
        .execute(&pool)
        .await
        .map_err(|e| StoreError::backend("set", key, e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let pool = self.pool("delete", key).await?;
        sqlx::query("DELETE FROM storage WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::backend("delete", key, e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let pool = self.pool("exists", key).await?;
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM storage \
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&pool)
        .await
        .map_err(|e| StoreError::backend("exists", key, e))?;

        Ok(row.is_some())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        // Key scans double as the sweep trigger; failures to reclaim
        // space are not failures to list.
        let _ = self.purge_expired().await;

        let pool = self.pool("keys_matching", pattern).await?;
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM storage \
             WHERE key LIKE ?1 ESCAPE '\\' AND (expires_at IS NULL OR expires_at > ?2) \
             ORDER BY key",
        )
        .bind(glob_to_like(pattern))
        .bind(now_millis())
        .fetch_all(&pool)
        .await
        .map_err(|e| StoreError::backend("keys_matching", pattern, e))?;

        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        let pool = self.pool("clear_all", "*").await?;
        sqlx::query("DELETE FROM storage")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::backend("clear_all", "*", e))?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let Some(pool) = self.pool.read().await.clone() else {
            return false;
        };
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&pool)
            .await
            .is_ok()
    }
}

/// Current wall clock as Unix milliseconds, the unit `expires_at` is
/// stored in.
fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry for a TTL, or `None` for non-positive TTLs (never
/// expires).
fn expiry_millis(ttl_seconds: i64) -> Option<i64> {
    if ttl_seconds <= 0 {
        return None;
    }
    Some(now_millis() + ttl_seconds.saturating_mul(1000))
}

/// Translate a glob pattern (`*`, `?`) to a SQL LIKE pattern, escaping
/// characters LIKE treats specially.
fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_translation() {
        assert_eq!(glob_to_like("session:*"), "session:%");
        assert_eq!(glob_to_like("plan:?bc"), "plan:_bc");
        assert_eq!(glob_to_like("a*b?c"), "a%b_c");
    }

    #[test]
    fn glob_translation_escapes_like_metacharacters() {
        assert_eq!(glob_to_like("100%_done"), "100\\%\\_done");
        assert_eq!(glob_to_like("back\\slash*"), "back\\\\slash%");
    }

    #[test]
    fn non_positive_ttl_never_expires() {
        assert_eq!(expiry_millis(0), None);
        assert_eq!(expiry_millis(-5), None);
    }

    #[test]
    fn positive_ttl_lands_in_the_future() {
        let before = now_millis();
        let expiry = expiry_millis(60).expect("should expire");
        assert!(expiry >= before + 60_000);
        assert!(expiry <= now_millis() + 60_000);
    }
}
