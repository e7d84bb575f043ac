//! Staging area: append, rotate, enumerate

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chq_config::StagingConfig;
use chq_store::{CoercedRow, is_valid_destination};
use dashmap::DashMap;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::STAGING_EXTENSION;
use crate::error::{Result, StagingError};
use crate::metrics::StagingMetrics;
use crate::snapshot::{Claims, FlushSnapshot};

/// Outcome of one append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Bytes written for this row, newline included
    pub bytes: u64,
    /// Bytes pending in the active file after this append
    pub pending_bytes: u64,
    /// This append opened a fresh active file
    pub fresh: bool,
}

/// Open active file plus the flush-policy inputs that belong to it
///
/// Rotation drops the whole handle and clears what [`Slot`] publishes, so the
/// first-pending instant and the byte counter never outlive their file. A
/// handle dropped after a failed write hands its instant to the next one.
#[derive(Debug)]
struct ActiveFile {
    file: File,
    first_pending: Instant,
    bytes: u64,
}

#[derive(Debug, Default)]
struct Pending {
    first_pending: Option<Instant>,
    bytes: u64,
}

/// Per-destination state; `writer` is the critical section
#[derive(Debug, Default)]
struct Slot {
    writer: Mutex<Option<ActiveFile>>,
    // mirrors the handle, written only while `writer` is held
    pending: parking_lot::Mutex<Pending>,
}

impl Slot {
    fn publish(&self, handle: Option<&ActiveFile>) {
        let mut pending = self.pending.lock();
        pending.first_pending = handle.map(|h| h.first_pending);
        pending.bytes = handle.map_or(0, |h| h.bytes);
    }
}

/// Kind of file found in the staging directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// `<destination>.sql`, still receiving appends
    Active,
    /// `<destination>.sql.<suffix>`, rotated and awaiting a load
    Snapshot,
}

/// One file in the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub destination: String,
    pub path: PathBuf,
    pub kind: PendingKind,
    pub bytes: u64,
    /// Snapshot currently owned by an in-flight load
    pub claimed: bool,
}

/// Work found by [`StagingArea::list_pending`]
#[derive(Debug, Default)]
pub struct PendingSet {
    /// Destinations with an active staging file on disk
    pub destinations: Vec<String>,
    /// Unclaimed snapshots, now claimed by the caller
    pub orphans: Vec<FlushSnapshot>,
}

/// Durable per-destination append logs
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    fsync: bool,
    slots: DashMap<String, Arc<Slot>>,
    claims: Claims,
    closed: AtomicBool,
    metrics: StagingMetrics,
}

impl StagingArea {
    /// Open (creating if needed) the configured staging directory
    pub async fn open(config: &StagingConfig) -> Result<Self> {
        Self::with_path(&config.path, config.fsync).await
    }

    /// Open a staging directory at an explicit path
    pub async fn with_path(dir: impl AsRef<Path>, fsync: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StagingError::io(&dir, e))?;

        tracing::info!(path = %dir.display(), fsync, "staging area opened");

        Ok(Self {
            dir,
            fsync,
            slots: DashMap::new(),
            claims: Claims::default(),
            closed: AtomicBool::new(false),
            metrics: StagingMetrics::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fsync(&self) -> bool {
        self.fsync
    }

    pub fn metrics(&self) -> &StagingMetrics {
        &self.metrics
    }

    /// Path of a destination's active staging file
    pub fn active_path(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{destination}.{STAGING_EXTENSION}"))
    }

    fn slot(&self, destination: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.get(destination) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.slots
                .entry(destination.to_string())
                .or_default()
                .value(),
        )
    }

    /// Stop accepting appends; rotation and loads keep working
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Accept appends again after [`StagingArea::close`]
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Append one row to the destination's active file
    ///
    /// The row is durable (synced, when fsync is on) when this returns.
    pub async fn append(&self, destination: &str, row: &CoercedRow) -> Result<AppendReceipt> {
        if !is_valid_destination(destination) {
            return Err(StagingError::InvalidDestination(destination.to_string()));
        }
        if self.is_closed() {
            return Err(StagingError::Closed);
        }

        let mut line = row.to_line();
        line.push('\n');

        let slot = self.slot(destination);
        let mut writer = slot.writer.lock().await;

        let fresh = writer.is_none();
        if fresh {
            let mut handle = self.open_active(destination).await?;
            // rows left by a dropped handle are still waiting in this file
            if let Some(first_pending) = slot.pending.lock().first_pending {
                handle.first_pending = first_pending;
            }
            *writer = Some(handle);
        }

        let path = self.active_path(destination);
        let Some(handle) = writer.as_mut() else {
            return Err(StagingError::Closed);
        };

        if let Err(e) = self.write_line(&mut handle.file, line.as_bytes()).await {
            self.metrics.record_append_error();
            // the file stays pending; reopen next time, a torn tail is
            // fenced off by `open_active`
            slot.publish(Some(&*handle));
            *writer = None;
            return Err(StagingError::io(path, e));
        }

        let bytes = line.len() as u64;
        handle.bytes += bytes;
        let receipt = AppendReceipt {
            bytes,
            pending_bytes: handle.bytes,
            fresh,
        };
        slot.publish(Some(&*handle));
        self.metrics.record_append(bytes);

        tracing::trace!(
            destination = %destination,
            bytes,
            pending_bytes = receipt.pending_bytes,
            "row staged"
        );

        Ok(receipt)
    }

    async fn write_line(&self, file: &mut File, line: &[u8]) -> std::io::Result<()> {
        file.write_all(line).await?;
        file.flush().await?;
        if self.fsync {
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Open the active file for appending
    ///
    /// A leftover file whose last line is incomplete gets a newline first, so
    /// the torn line stays isolated and the next row starts cleanly.
    async fn open_active(&self, destination: &str) -> Result<ActiveFile> {
        let path = self.active_path(destination);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await
            .map_err(|e| StagingError::io(&path, e))?;

        let mut bytes = file
            .metadata()
            .await
            .map_err(|e| StagingError::io(&path, e))?
            .len();

        if bytes > 0
            && !ends_with_newline(&mut file)
                .await
                .map_err(|e| StagingError::io(&path, e))?
        {
            tracing::warn!(
                destination = %destination,
                path = %path.display(),
                "staging file ends with a partial line, fencing it off"
            );
            file.write_all(b"\n")
                .await
                .map_err(|e| StagingError::io(&path, e))?;
            bytes += 1;
        }

        Ok(ActiveFile {
            file,
            first_pending: Instant::now(),
            bytes,
        })
    }

    // =========================================================================
    // Rotate
    // =========================================================================

    /// Rotate the active file into a claimed snapshot
    ///
    /// Returns `None` when the destination has no active file on disk.
    pub async fn rotate(&self, destination: &str) -> Result<Option<FlushSnapshot>> {
        if !is_valid_destination(destination) {
            return Err(StagingError::InvalidDestination(destination.to_string()));
        }

        let slot = self.slot(destination);
        let mut writer = slot.writer.lock().await;

        slot.publish(None);
        if let Some(mut handle) = writer.take() {
            if let Err(e) = handle.file.flush().await {
                tracing::warn!(destination = %destination, error = %e, "flush before rotation failed");
            }
        }

        let active = self.active_path(destination);
        match tokio::fs::metadata(&active).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StagingError::io(&active, e)),
        }

        let target = self.snapshot_path(destination);
        tokio::fs::rename(&active, &target)
            .await
            .map_err(|e| StagingError::io(&active, e))?;
        self.metrics.record_rotation();

        tracing::debug!(
            destination = %destination,
            snapshot = %target.display(),
            "staging file rotated"
        );

        // a fresh uuid can't already be claimed
        Ok(self.claims.try_claim(destination, target, false))
    }

    fn snapshot_path(&self, destination: &str) -> PathBuf {
        let suffix = uuid::Uuid::new_v4().simple();
        self.dir
            .join(format!("{destination}.{STAGING_EXTENSION}.{suffix}"))
    }

    // =========================================================================
    // Flush policy inputs
    // =========================================================================

    /// When the oldest unflushed row of the active file was written
    pub fn first_pending(&self, destination: &str) -> Option<Instant> {
        self.slots
            .get(destination)
            .and_then(|slot| slot.pending.lock().first_pending)
    }

    /// Bytes in the active file
    pub fn pending_bytes(&self, destination: &str) -> u64 {
        self.slots
            .get(destination)
            .map_or(0, |slot| slot.pending.lock().bytes)
    }

    // =========================================================================
    // Enumerate
    // =========================================================================

    /// Every staging file and snapshot in the directory
    pub async fn inventory(&self) -> Result<Vec<PendingFile>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StagingError::io(&self.dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StagingError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some((destination, kind)) = classify(name) else {
                continue;
            };

            let path = entry.path();
            let bytes = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(_) => continue,
                // raced with a rotation or a completed load
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StagingError::io(&path, e)),
            };
            let claimed = kind == PendingKind::Snapshot && self.claims.is_claimed(&path);

            files.push(PendingFile {
                destination: destination.to_string(),
                path,
                kind,
                bytes,
                claimed,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Destinations with an active file, and optionally every unclaimed snapshot
    ///
    /// Returned orphans are claimed by the caller until dropped.
    pub async fn list_pending(&self, include_orphans: bool) -> Result<PendingSet> {
        let mut set = PendingSet::default();

        for file in self.inventory().await? {
            match file.kind {
                PendingKind::Active => set.destinations.push(file.destination),
                PendingKind::Snapshot if include_orphans && !file.claimed => {
                    if let Some(snapshot) =
                        self.claims.try_claim(&file.destination, file.path, true)
                    {
                        set.orphans.push(snapshot);
                    }
                }
                PendingKind::Snapshot => {}
            }
        }

        Ok(set)
    }
}

/// Map a directory entry name to its destination and kind
fn classify(name: &str) -> Option<(&str, PendingKind)> {
    let active_suffix = format!(".{STAGING_EXTENSION}");
    if let Some(destination) = name.strip_suffix(active_suffix.as_str()) {
        return is_valid_destination(destination).then_some((destination, PendingKind::Active));
    }

    let marker = format!(".{STAGING_EXTENSION}.");
    let (destination, suffix) = name.split_once(marker.as_str())?;
    let valid_suffix = !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_alphanumeric());
    (is_valid_destination(destination) && valid_suffix).then_some((destination, PendingKind::Snapshot))
}

async fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
#[path = "area_test.rs"]
mod area_test;
