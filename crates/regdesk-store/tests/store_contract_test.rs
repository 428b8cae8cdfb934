//! Backend contract tests.
//!
//! One shared suite exercises the [`KeyValueStore`] contract and runs
//! against both backends; any new backend must pass it unchanged.
//! Backend-specific probes (durability across reconnects, corruption
//! injection) follow.
//!
//! The Redis-backed tests start a container via testcontainers unless
//! `REGDESK_TEST_REDIS_URL` points at a running server.

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use regdesk_store::error::StoreError;
use regdesk_store::store::{KeyValueStore, SqliteStore};

// -----------------------------------------------------------------------
// Shared contract suite
// -----------------------------------------------------------------------

async fn run_contract(store: &dyn KeyValueStore) {
    // set / get round-trip.
    let value = json!({ "tier": "fastest", "steps": [1, 2, 3] });
    store
        .set("contract:roundtrip", &value, 0)
        .await
        .expect("set should succeed");
    let fetched = store
        .get("contract:roundtrip")
        .await
        .expect("get should succeed")
        .expect("value should be present");
    assert_eq!(fetched, value);

    // Missing keys read as None, not as an error.
    let missing = store
        .get("contract:missing")
        .await
        .expect("get should succeed");
    assert!(missing.is_none());

    // set overwrites in place.
    store
        .set("contract:roundtrip", &json!({ "tier": "cheapest" }), 0)
        .await
        .expect("overwrite should succeed");
    let overwritten = store
        .get("contract:roundtrip")
        .await
        .expect("get should succeed")
        .expect("value should be present");
    assert_eq!(overwritten, json!({ "tier": "cheapest" }));

    // exists reflects liveness.
    assert!(store.exists("contract:roundtrip").await.expect("exists"));
    assert!(!store.exists("contract:missing").await.expect("exists"));

    // delete succeeds even when the key is gone.
    store
        .delete("contract:roundtrip")
        .await
        .expect("delete should succeed");
    store
        .delete("contract:roundtrip")
        .await
        .expect("second delete should also succeed");
    assert!(
        store
            .get("contract:roundtrip")
            .await
            .expect("get should succeed")
            .is_none()
    );

    // A positive TTL expires the key; a non-positive TTL never does.
    store
        .set("contract:short", &json!(1), 1)
        .await
        .expect("set should succeed");
    store
        .set("contract:eternal", &json!(2), 0)
        .await
        .expect("set should succeed");
    assert!(store.exists("contract:short").await.expect("exists"));

    sleep(Duration::from_millis(1300)).await;

    assert!(
        store
            .get("contract:short")
            .await
            .expect("get should succeed")
            .is_none(),
        "key with 1s TTL should have expired"
    );
    assert!(!store.exists("contract:short").await.expect("exists"));
    assert_eq!(
        store
            .get("contract:eternal")
            .await
            .expect("get should succeed"),
        Some(json!(2)),
        "TTL 0 key should never expire"
    );

    // Each successful write resets the expiry clock.
    store
        .set("contract:refreshed", &json!("a"), 2)
        .await
        .expect("set should succeed");
    sleep(Duration::from_millis(1200)).await;
    store
        .set("contract:refreshed", &json!("b"), 2)
        .await
        .expect("rewrite should succeed");
    sleep(Duration::from_millis(1200)).await;
    // 2.4s after the first write, but only 1.2s after the second.
    assert_eq!(
        store
            .get("contract:refreshed")
            .await
            .expect("get should succeed"),
        Some(json!("b")),
        "rewrite should have reset the expiry clock"
    );

    // keys_matching filters by pattern and excludes expired keys.
    store
        .set("scan:alpha", &json!(1), 0)
        .await
        .expect("set should succeed");
    store
        .set("scan:beta", &json!(2), 0)
        .await
        .expect("set should succeed");
    store
        .set("scan:gone", &json!(3), 1)
        .await
        .expect("set should succeed");
    store
        .set("other:gamma", &json!(4), 0)
        .await
        .expect("set should succeed");

    sleep(Duration::from_millis(1300)).await;

    let mut keys = store
        .keys_matching("scan:*")
        .await
        .expect("keys_matching should succeed");
    keys.sort();
    assert_eq!(keys, vec!["scan:alpha".to_string(), "scan:beta".to_string()]);

    let single = store
        .keys_matching("scan:alph?")
        .await
        .expect("keys_matching should succeed");
    assert_eq!(single, vec!["scan:alpha".to_string()]);

    // health_check reports connected without erroring.
    assert!(store.health_check().await);

    // clear_all wipes everything.
    store.clear_all().await.expect("clear_all should succeed");
    let leftover = store
        .keys_matching("*")
        .await
        .expect("keys_matching should succeed");
    assert!(leftover.is_empty(), "clear_all should leave no keys");
}

#[tokio::test]
async fn sqlite_satisfies_contract() {
    let (store, _dir) = regdesk_test_utils::connected_sqlite_store().await;
    run_contract(&store).await;
}

#[tokio::test]
async fn redis_satisfies_contract() {
    let store = regdesk_test_utils::redis_store().await;
    run_contract(&store).await;
}

#[tokio::test]
async fn factory_builds_the_configured_backend() {
    use regdesk_store::config::StoreConfig;

    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = StoreConfig::sqlite(dir.path().join("factory.db"));

    let store = regdesk_store::connect_store(&config)
        .await
        .expect("factory should build and connect the embedded backend");
    assert!(store.health_check().await);

    store.set("k", &json!(1), 0).await.expect("set should succeed");
    assert_eq!(store.get("k").await.expect("get"), Some(json!(1)));
}

// -----------------------------------------------------------------------
// Embedded backend specifics
// -----------------------------------------------------------------------

#[tokio::test]
async fn sqlite_connect_is_idempotent_and_disconnect_is_safe() {
    let (store, _dir) = regdesk_test_utils::sqlite_store();

    assert!(!store.health_check().await, "unconnected store is unhealthy");

    store.connect().await.expect("connect should succeed");
    store.connect().await.expect("second connect is a no-op");
    assert!(store.health_check().await);

    store.disconnect().await.expect("disconnect should succeed");
    store
        .disconnect()
        .await
        .expect("second disconnect is a no-op");
    assert!(!store.health_check().await);

    // Operations on a disconnected store fail with a Backend error
    // naming the operation and key.
    let err = store.get("k").await.expect_err("get should fail");
    match err {
        StoreError::Backend { op, key, .. } => {
            assert_eq!(op, "get");
            assert_eq!(key, "k");
        }
        other => panic!("expected Backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn sqlite_data_survives_reconnect() {
    let (store, dir) = regdesk_test_utils::connected_sqlite_store().await;
    store
        .set("durable", &json!({ "kept": true }), 0)
        .await
        .expect("set should succeed");
    let path = store.path().to_path_buf();
    store.disconnect().await.expect("disconnect should succeed");

    // A brand-new store over the same file sees the data.
    let reopened = SqliteStore::new(&path, Duration::from_secs(10));
    reopened.connect().await.expect("reconnect should succeed");
    let value = reopened
        .get("durable")
        .await
        .expect("get should succeed")
        .expect("value should have survived");
    assert_eq!(value, json!({ "kept": true }));

    drop(dir);
}

#[tokio::test]
async fn sqlite_unparsable_value_is_corruption_not_a_miss() {
    let (store, _dir) = regdesk_test_utils::connected_sqlite_store().await;
    store
        .set("mangled", &json!({ "ok": true }), 0)
        .await
        .expect("set should succeed");

    // Vandalize the stored text through a second connection.
    let raw = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(sqlx::sqlite::SqliteConnectOptions::new().filename(store.path()))
        .await
        .expect("raw connection should open");
    sqlx::query("UPDATE storage SET value = 'not json' WHERE key = 'mangled'")
        .execute(&raw)
        .await
        .expect("raw update should succeed");
    raw.close().await;

    let err = store.get("mangled").await.expect_err("get should fail");
    assert!(
        matches!(err, StoreError::Corruption { ref key, .. } if key == "mangled"),
        "expected Corruption, got {err:?}"
    );
}

#[tokio::test]
async fn sqlite_purge_reclaims_expired_rows() {
    let (store, _dir) = regdesk_test_utils::connected_sqlite_store().await;
    store
        .set("fleeting", &json!(1), 1)
        .await
        .expect("set should succeed");
    store
        .set("lasting", &json!(2), 0)
        .await
        .expect("set should succeed");

    sleep(Duration::from_millis(1300)).await;

    // The filter already hides the expired row; the sweep only
    // reclaims space.
    assert!(store.get("fleeting").await.expect("get").is_none());
    let purged = store.purge_expired().await.expect("purge should succeed");
    assert_eq!(purged, 1);
    assert_eq!(store.get("lasting").await.expect("get"), Some(json!(2)));
}

// -----------------------------------------------------------------------
// Networked backend specifics
// -----------------------------------------------------------------------

#[tokio::test]
async fn redis_connect_is_idempotent_and_disconnect_is_safe() {
    let store = regdesk_test_utils::redis_store().await;

    store.connect().await.expect("second connect is a no-op");
    assert!(store.health_check().await);

    store.disconnect().await.expect("disconnect should succeed");
    store
        .disconnect()
        .await
        .expect("second disconnect is a no-op");
    assert!(!store.health_check().await);

    let err = store.set("k", &json!(1), 0).await.expect_err("set should fail");
    assert!(
        matches!(err, StoreError::Backend { op: "set", .. }),
        "expected Backend error, got {err:?}"
    );
}

#[tokio::test]
async fn redis_unparsable_value_is_corruption_not_a_miss() {
    let store = regdesk_test_utils::redis_store().await;
    store
        .set("mangled", &json!({ "ok": true }), 0)
        .await
        .expect("set should succeed");

    // Vandalize the stored text through a raw client on the same
    // logical database.
    let client = redis::Client::open(store.url()).expect("client should open");
    let mut con = client
        .get_multiplexed_async_connection()
        .await
        .expect("raw connection should open");
    let _: () = redis::cmd("SET")
        .arg("mangled")
        .arg("not json")
        .query_async(&mut con)
        .await
        .expect("raw SET should succeed");

    let err = store.get("mangled").await.expect_err("get should fail");
    assert!(
        matches!(err, StoreError::Corruption { ref key, .. } if key == "mangled"),
        "expected Corruption, got {err:?}"
    );
}

#[tokio::test]
async fn unreachable_redis_is_unavailable_at_connect() {
    use regdesk_store::store::RedisStore;

    // Nothing listens on this port.
    let store = RedisStore::new("redis://127.0.0.1:1", Duration::from_secs(2));
    let err = store.connect().await.expect_err("connect should fail");
    assert!(
        matches!(err, StoreError::Unavailable(_)),
        "expected Unavailable, got {err:?}"
    );
    assert!(!store.health_check().await);
}
