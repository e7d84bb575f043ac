//! Tests for the serve cycle over the in-memory broker and store

use std::collections::BTreeMap;
use std::time::Duration;

use chq_broker::{Headers, MemoryBroker};
use async_trait::async_trait;
use chq_store::{BulkInsert, CoercedRow, ColumnDescription, MemoryStore, Store, StoreError};
use tempfile::TempDir;
use tokio::sync::oneshot;

use super::*;

// =============================================================================
// Helpers
// =============================================================================

fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.staging.path = dir.path().to_path_buf();
    config.staging.fsync = false;
    config.global.startup_pause = Duration::from_millis(10);
    config.global.shutdown_grace = Duration::from_secs(1);
    config.broker.reject_delay = Duration::from_millis(10);
    config.broker.reconnect_backoff = Duration::from_millis(10);
    config
}

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_table(
        "events",
        vec![
            ColumnDescription::new("id", "UInt64"),
            ColumnDescription::new("name", "String"),
        ],
    );
    store
}

fn publish(broker: &MemoryBroker, config: &Config, body: &str) {
    let mut headers = Headers::new();
    headers.insert("table".into(), "events".into());
    broker.publish(&config.broker.queue, body.to_string(), headers);
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition within two seconds");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_shutdown_keeps_acked_rows_staged() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let engine = Engine::with_store(&config, store()).await.unwrap();
    let staging = Arc::clone(&engine.staging);
    let broker = MemoryBroker::new();

    publish(&broker, &config, r#"{"id": 1, "name": "a"}"#);
    publish(&broker, &config, r#"{"id": 2, "name": "b"}"#);

    let (tx, rx) = oneshot::channel();
    let daemon = run_daemon(&config, engine, Arc::new(broker.clone()), async {
        rx.await.unwrap_or(Stop::Shutdown)
    });
    let driver = async {
        wait_until(|| broker.acked().len() == 2).await;
        tx.send(Stop::Shutdown).unwrap();
    };
    let (result, ()) = tokio::join!(daemon, driver);

    assert_eq!(result.unwrap(), Stop::Shutdown);
    assert!(staging.is_closed());

    let staged = std::fs::read_to_string(dir.path().join("events.sql")).unwrap();
    assert_eq!(staged.lines().count(), 2);
}

#[tokio::test]
async fn test_startup_loads_leftovers_before_subscribing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = store();
    let engine = Engine::with_store(&config, store.clone()).await.unwrap();

    let row = CoercedRow::new(BTreeMap::from([
        ("id".to_string(), "1".to_string()),
        ("name".to_string(), "'left'".to_string()),
    ]));
    engine.staging.append("events", &row).await.unwrap();

    let broker = MemoryBroker::new();
    let result = run_daemon(&config, engine, Arc::new(broker.clone()), async {
        Stop::Reload
    })
    .await;

    assert_eq!(result.unwrap(), Stop::Reload);
    assert_eq!(store.row_count("events"), 1);
    assert!(!broker.is_declared(&config.broker.queue));
}

#[tokio::test]
async fn test_broker_loss_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.broker.health_check_interval = Duration::from_millis(20);
    let engine = Engine::with_store(&config, store()).await.unwrap();
    let broker = MemoryBroker::new();

    let daemon = run_daemon(
        &config,
        engine,
        Arc::new(broker.clone()),
        std::future::pending(),
    );
    let driver = async {
        wait_until(|| broker.is_declared(&config.broker.queue)).await;
        broker.disconnect();
    };
    let (result, ()) = tokio::join!(daemon, driver);

    assert!(result.is_err());
}

// =============================================================================
// Reload
// =============================================================================

#[tokio::test]
async fn test_reload_keeps_in_flight_snapshot_claimed() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = store();

    let staging = staging_for_cycle(None, &config).await.unwrap();
    let row = CoercedRow::new(BTreeMap::from([
        ("id".to_string(), "1".to_string()),
        ("name".to_string(), "'slow'".to_string()),
    ]));
    staging.append("events", &row).await.unwrap();
    // still owned by a load from the previous cycle
    let in_flight = staging.rotate("events").await.unwrap().unwrap();
    staging.close();

    let reloaded = staging_for_cycle(Some(Arc::clone(&staging)), &config)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&staging, &reloaded));
    assert!(!reloaded.is_closed());

    let engine = Engine::assemble(&config, store.clone(), reloaded);
    let result = run_daemon(&config, engine, Arc::new(MemoryBroker::new()), async {
        Stop::Reload
    })
    .await;

    assert_eq!(result.unwrap(), Stop::Reload);
    assert_eq!(store.row_count("events"), 0);
    assert!(in_flight.path().exists());
}

#[tokio::test]
async fn test_reload_into_new_directory_opens_new_area() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    let staging = staging_for_cycle(None, &config(&first)).await.unwrap();
    let moved = staging_for_cycle(Some(Arc::clone(&staging)), &config(&second))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&staging, &moved));
    assert_eq!(moved.dir(), second.path());
}

/// Memory store whose introspection takes a while
struct SlowDescribe {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

#[async_trait]
impl Store for SlowDescribe {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.describe(table).await
    }

    async fn bulk_insert(&self, insert: &BulkInsert) -> Result<(), StoreError> {
        self.inner.bulk_insert(insert).await
    }
}

#[tokio::test]
async fn test_shutdown_requeues_messages_still_in_flight() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = Arc::new(SlowDescribe {
        inner: store(),
        delay: Duration::from_millis(200),
    });
    let engine = Engine::with_store(&config, store).await.unwrap();
    let broker = MemoryBroker::new();
    publish(&broker, &config, r#"{"id": 1, "name": "late"}"#);

    let result = run_daemon(&config, engine, Arc::new(broker.clone()), async {
        wait_until(|| broker.unacked() == 1).await;
        Stop::Shutdown
    })
    .await;

    assert_eq!(result.unwrap(), Stop::Shutdown);
    let rejected = broker.rejected();
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].1, "requeued");
    assert!(broker.acked().is_empty());
    assert!(!dir.path().join("events.sql").exists());
}
