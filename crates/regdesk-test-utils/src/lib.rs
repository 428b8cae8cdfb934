//! Shared test utilities for regdesk integration tests.
//!
//! Provides a Redis instance shared across tests and temp-file SQLite
//! stores. Each Redis-backed test gets its own logical database within
//! the instance.
//!
//! Two modes:
//! - **`REGDESK_TEST_REDIS_URL`** set (CI setup script): use the
//!   external server directly; must point at the server root
//!   (`redis://host:port`, no database suffix). No testcontainers
//!   overhead per process.
//! - **No env var** (`cargo test`): spin up a container via
//!   testcontainers, shared per binary through a `OnceCell`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use tokio::sync::OnceCell;

use regdesk_store::store::{KeyValueStore, RedisStore, SqliteStore};

/// Shared container state: base URL and optional container handle
/// (kept alive).
struct SharedRedis {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external
    /// URL.
    _container: Option<ContainerAsync<Redis>>,
}

/// Lazily-initialized shared Redis.
static SHARED_REDIS: OnceCell<SharedRedis> = OnceCell::const_new();

/// Rotates Redis-backed tests across the instance's 16 logical
/// databases. Each acquisition flushes its database, so collisions
/// only matter with more than 16 live Redis tests in one binary.
static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

async fn init_shared_redis() -> SharedRedis {
    // If a setup script already provides a server, use that directly.
    if let Ok(url) = std::env::var("REGDESK_TEST_REDIS_URL") {
        return SharedRedis {
            base_url: url,
            _container: None,
        };
    }

    let container = Redis::default()
        .with_tag("7")
        .start()
        .await
        .expect("failed to start Redis container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(REDIS_PORT)
        .await
        .expect("failed to get mapped port");

    SharedRedis {
        base_url: format!("redis://{host}:{port}"),
        _container: Some(container),
    }
}

/// Base URL for the shared Redis.
///
/// Lazily starts a container on first call (unless
/// `REGDESK_TEST_REDIS_URL` is set). The URL points at the server root
/// (no logical database appended).
pub async fn redis_url() -> &'static str {
    let shared = SHARED_REDIS.get_or_init(init_shared_redis).await;
    &shared.base_url
}

/// A connected [`RedisStore`] on its own freshly-flushed logical
/// database within the shared instance.
pub async fn redis_store() -> RedisStore {
    let base = redis_url().await;
    let db = NEXT_DB.fetch_add(1, Ordering::Relaxed) % 16;

    let store = RedisStore::new(format!("{base}/{db}"), Duration::from_secs(30));
    store.connect().await.expect("redis store should connect");
    store
        .clear_all()
        .await
        .expect("flushing the test database should succeed");
    store
}

/// An unconnected [`SqliteStore`] on a fresh temp-directory database
/// file. The [`TempDir`] must be kept alive for the store's lifetime.
pub fn sqlite_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SqliteStore::new(dir.path().join("store.db"), Duration::from_secs(10));
    (store, dir)
}

/// A connected [`SqliteStore`] on a fresh temp-directory database file.
pub async fn connected_sqlite_store() -> (SqliteStore, TempDir) {
    let (store, dir) = sqlite_store();
    store.connect().await.expect("sqlite store should connect");
    (store, dir)
}
