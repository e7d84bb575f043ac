//! Tests for the schema cache

use std::sync::Arc;

use super::*;
use crate::client::ColumnDescription;
use crate::memory::MemoryStore;
use crate::schema::LogicalType;

fn store_with_events() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_table(
        "events",
        vec![
            ColumnDescription::new("id", "UInt64"),
            ColumnDescription::new("name", "Nullable(String)"),
        ],
    );
    store
}

#[tokio::test]
async fn test_miss_then_hit() {
    let store = store_with_events();
    let cache = SchemaCache::new(store.clone());

    let schema = cache.get("events").await.unwrap();
    assert_eq!(schema.len(), 2);
    let name = schema.column("name").unwrap();
    assert!(name.nullable);
    assert_eq!(name.logical_type, LogicalType::String);

    cache.get("events").await.unwrap();
    assert_eq!(store.describe_calls(), 1);

    let snapshot = cache.metrics().snapshot();
    assert_eq!(snapshot.fetches, 1);
    assert_eq!(snapshot.hits, 1);
}

#[tokio::test]
async fn test_concurrent_misses_issue_one_fetch() {
    let store = store_with_events();
    let cache = Arc::new(SchemaCache::new(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { cache.get("events").await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(store.describe_calls(), 1);
    assert_eq!(cache.metrics().snapshot().fetches, 1);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let store = store_with_events();
    let cache = SchemaCache::new(store.clone());

    cache.get("events").await.unwrap();
    store.add_column("events", ColumnDescription::new("referer", "String"));

    // still served from cache
    assert!(cache.get("events").await.unwrap().column("referer").is_none());

    cache.invalidate("events");
    let schema = cache.get("events").await.unwrap();
    assert!(schema.column("referer").is_some());
    assert_eq!(store.describe_calls(), 2);
    assert_eq!(cache.metrics().snapshot().invalidations, 1);
}

#[tokio::test]
async fn test_invalidate_missing_entry_is_noop() {
    let cache = SchemaCache::new(store_with_events());
    cache.invalidate("events");
    assert_eq!(cache.metrics().snapshot().invalidations, 0);
}

#[tokio::test]
async fn test_fetch_errors_not_cached() {
    let store = store_with_events();
    let cache = SchemaCache::new(store.clone());

    store.set_unavailable(true);
    let err = cache.get("events").await.unwrap_err();
    assert!(err.is_connection());

    store.set_unavailable(false);
    assert!(cache.get("events").await.is_ok());
    assert_eq!(store.describe_calls(), 2);
}
