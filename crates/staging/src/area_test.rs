//! Tests for the staging area

use std::collections::BTreeMap;
use std::sync::Arc;

use chq_store::StagedRow;
use tempfile::TempDir;

use super::*;

// =============================================================================
// Helpers
// =============================================================================

fn row(id: u64) -> CoercedRow {
    let mut values = BTreeMap::new();
    values.insert("id".to_string(), id.to_string());
    values.insert("name".to_string(), format!("'row-{id}'"));
    CoercedRow::new(values)
}

async fn area(dir: &TempDir) -> StagingArea {
    StagingArea::with_path(dir.path(), false).await.unwrap()
}

fn ids(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(StagedRow::parse)
        .map(|r| r.tuple)
        .collect()
}

// =============================================================================
// Append
// =============================================================================

#[tokio::test]
async fn test_append_writes_one_line() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    let receipt = area.append("events", &row(1)).await.unwrap();
    assert!(receipt.fresh);
    assert_eq!(receipt.pending_bytes, receipt.bytes);

    let contents = std::fs::read_to_string(area.active_path("events")).unwrap();
    assert_eq!(contents, "[\"id\",\"name\"]\t(1,'row-1')\n");
    assert_eq!(receipt.bytes, contents.len() as u64);
}

#[tokio::test]
async fn test_pending_stats_track_active_file() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    assert!(area.first_pending("events").is_none());
    assert_eq!(area.pending_bytes("events"), 0);

    let first = area.append("events", &row(1)).await.unwrap();
    let second = area.append("events", &row(2)).await.unwrap();
    assert!(!second.fresh);
    assert_eq!(second.pending_bytes, first.bytes + second.bytes);
    assert_eq!(area.pending_bytes("events"), second.pending_bytes);
    assert!(area.first_pending("events").is_some());

    area.rotate("events").await.unwrap().unwrap();
    assert!(area.first_pending("events").is_none());
    assert_eq!(area.pending_bytes("events"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_pending_is_first_append_after_rotation() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    area.append("events", &row(1)).await.unwrap();
    let first = area.first_pending("events").unwrap();

    tokio::time::advance(std::time::Duration::from_secs(5)).await;
    area.append("events", &row(2)).await.unwrap();
    assert_eq!(area.first_pending("events"), Some(first));

    area.rotate("events").await.unwrap();
    tokio::time::advance(std::time::Duration::from_secs(5)).await;
    area.append("events", &row(3)).await.unwrap();
    assert!(area.first_pending("events").unwrap() > first);
}

#[tokio::test]
async fn test_concurrent_appends_never_interleave() {
    let dir = TempDir::new().unwrap();
    let area = Arc::new(area(&dir).await);

    let mut handles = Vec::new();
    for id in 0..64 {
        let area = Arc::clone(&area);
        handles.push(tokio::spawn(async move { area.append("events", &row(id)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let contents = std::fs::read_to_string(area.active_path("events")).unwrap();
    assert_eq!(contents.lines().count(), 64);
    assert_eq!(ids(&contents).len(), 64);
    assert_eq!(area.metrics().snapshot().rows_appended, 64);
}

#[tokio::test]
async fn test_invalid_destination_rejected() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    for name in ["../escape", "", "a.b", "with space"] {
        let err = area.append(name, &row(1)).await.unwrap_err();
        assert!(matches!(err, StagingError::InvalidDestination(_)), "{name}");
    }
}

#[tokio::test]
async fn test_closed_area_rejects_appends() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    area.append("events", &row(1)).await.unwrap();

    area.close();
    assert!(matches!(
        area.append("events", &row(2)).await,
        Err(StagingError::Closed)
    ));
    // rotation still works so in-flight data can drain
    assert!(area.rotate("events").await.unwrap().is_some());
}

#[tokio::test]
async fn test_torn_tail_is_fenced() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    std::fs::write(area.active_path("events"), "[\"id\"]\t(99").unwrap();

    area.append("events", &row(1)).await.unwrap();

    let contents = std::fs::read_to_string(area.active_path("events")).unwrap();
    assert_eq!(ids(&contents), ["(1,'row-1')"]);
    assert!(contents.starts_with("[\"id\"]\t(99\n"));
}

#[tokio::test]
async fn test_fsync_enabled_append() {
    let dir = TempDir::new().unwrap();
    let area = StagingArea::with_path(dir.path(), true).await.unwrap();
    area.append("events", &row(1)).await.unwrap();
    assert_eq!(area.metrics().snapshot().rows_appended, 1);
}

// =============================================================================
// Rotate
// =============================================================================

#[tokio::test]
async fn test_rotate_without_file() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    assert!(area.rotate("events").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rotate_moves_exactly_pending_rows() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    area.append("events", &row(1)).await.unwrap();
    area.append("events", &row(2)).await.unwrap();
    let snapshot = area.rotate("events").await.unwrap().unwrap();

    assert_eq!(snapshot.destination(), "events");
    assert!(!snapshot.is_orphan());
    assert!(!area.active_path("events").exists());

    let receipt = area.append("events", &row(3)).await.unwrap();
    assert!(receipt.fresh);

    let rotated = snapshot.read().await.unwrap().unwrap();
    assert_eq!(ids(&rotated), ["(1,'row-1')", "(2,'row-2')"]);

    let active = std::fs::read_to_string(area.active_path("events")).unwrap();
    assert_eq!(ids(&active), ["(3,'row-3')"]);
}

#[tokio::test]
async fn test_rotate_picks_up_leftover_file() {
    let dir = TempDir::new().unwrap();
    {
        let area = area(&dir).await;
        area.append("events", &row(1)).await.unwrap();
    }

    // new process, no open handle
    let area = area(&dir).await;
    let snapshot = area.rotate("events").await.unwrap().unwrap();
    assert_eq!(ids(&snapshot.read().await.unwrap().unwrap()).len(), 1);
}

#[tokio::test]
async fn test_snapshot_replace_and_remove() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    area.append("events", &row(1)).await.unwrap();
    area.append("events", &row(2)).await.unwrap();
    let snapshot = area.rotate("events").await.unwrap().unwrap();

    snapshot.replace(&format!("{}\n", row(2).to_line())).await.unwrap();
    assert_eq!(ids(&snapshot.read().await.unwrap().unwrap()), ["(2,'row-2')"]);

    let path = snapshot.path().to_path_buf();
    snapshot.remove().await.unwrap();
    assert!(!path.exists());
    assert!(area.inventory().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rotation_during_appends_keeps_every_row_once() {
    let dir = TempDir::new().unwrap();
    let area = Arc::new(area(&dir).await);
    let appending = Arc::new(AtomicBool::new(true));

    let rotator = {
        let area = Arc::clone(&area);
        let appending = Arc::clone(&appending);
        tokio::spawn(async move {
            let mut rotated = String::new();
            while appending.load(Ordering::SeqCst) {
                if let Some(snapshot) = area.rotate("events").await.unwrap() {
                    rotated.push_str(&snapshot.read().await.unwrap().unwrap());
                    snapshot.remove().await.unwrap();
                }
                tokio::task::yield_now().await;
            }
            rotated
        })
    };

    let mut writers = Vec::new();
    for writer in 0..8u64 {
        let area = Arc::clone(&area);
        writers.push(tokio::spawn(async move {
            for i in 0..50 {
                area.append("events", &row(writer * 1000 + i)).await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }
    appending.store(false, Ordering::SeqCst);

    let mut staged = rotator.await.unwrap();
    if let Some(snapshot) = area.rotate("events").await.unwrap() {
        staged.push_str(&snapshot.read().await.unwrap().unwrap());
    }

    // no split lines: every line parses
    assert_eq!(staged.lines().count(), 400);
    let mut rows = ids(&staged);
    assert_eq!(rows.len(), 400);

    rows.sort();
    rows.dedup();
    assert_eq!(rows.len(), 400);
    assert!(area.metrics().snapshot().rotations >= 1);
}

#[cfg(target_os = "linux")]
#[tokio::test(start_paused = true)]
async fn test_failed_write_keeps_destination_pending() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    // every write to /dev/full fails with ENOSPC
    std::os::unix::fs::symlink("/dev/full", area.active_path("events")).unwrap();

    assert!(area.append("events", &row(1)).await.is_err());
    let first = area.first_pending("events").unwrap();

    tokio::time::advance(std::time::Duration::from_secs(30)).await;
    assert!(area.append("events", &row(2)).await.is_err());
    assert_eq!(area.first_pending("events"), Some(first));
    assert_eq!(area.metrics().snapshot().append_errors, 2);
}

// =============================================================================
// Enumerate
// =============================================================================

#[tokio::test]
async fn test_list_pending_active_only() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    area.append("events", &row(1)).await.unwrap();
    area.append("users", &row(1)).await.unwrap();
    let _rotated = area.rotate("users").await.unwrap().unwrap();
    area.append("users", &row(2)).await.unwrap();

    let pending = area.list_pending(false).await.unwrap();
    assert_eq!(pending.destinations, ["events", "users"]);
    assert!(pending.orphans.is_empty());
}

#[tokio::test]
async fn test_orphans_skip_claimed_snapshots() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;

    area.append("events", &row(1)).await.unwrap();
    let in_flight = area.rotate("events").await.unwrap().unwrap();

    let pending = area.list_pending(true).await.unwrap();
    assert!(pending.orphans.is_empty());

    drop(in_flight);
    let pending = area.list_pending(true).await.unwrap();
    assert_eq!(pending.orphans.len(), 1);
    assert!(pending.orphans[0].is_orphan());
    assert_eq!(pending.orphans[0].destination(), "events");

    // held by the first listing
    assert!(area.list_pending(true).await.unwrap().orphans.is_empty());
}

#[tokio::test]
async fn test_inventory_ignores_foreign_files() {
    let dir = TempDir::new().unwrap();
    let area = area(&dir).await;
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
    std::fs::write(dir.path().join("events.sql.abc.tmp"), "x").unwrap();
    std::fs::write(dir.path().join("bad name.sql"), "x").unwrap();
    std::fs::write(dir.path().join("events.sql.0123abcd"), "x\n").unwrap();
    area.append("events", &row(1)).await.unwrap();

    let files = area.inventory().await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].kind, PendingKind::Active);
    assert_eq!(files[1].kind, PendingKind::Snapshot);
    assert_eq!(files[1].bytes, 2);
    assert!(!files[1].claimed);
}

#[test]
fn test_classify() {
    assert_eq!(classify("events.sql"), Some(("events", PendingKind::Active)));
    assert_eq!(
        classify("events.sql.9f8e7d"),
        Some(("events", PendingKind::Snapshot))
    );
    assert_eq!(classify("events.sql.9f8e7d.tmp"), None);
    assert_eq!(classify("events.sql."), None);
    assert_eq!(classify(".sql"), None);
}
