//! Rotated staging snapshots and their claims

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StagingError};

/// Paths currently owned by an in-flight load
#[derive(Debug, Clone, Default)]
pub(crate) struct Claims {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Claims {
    /// Claim a snapshot path; `None` if someone else holds it
    pub(crate) fn try_claim(
        &self,
        destination: &str,
        path: PathBuf,
        orphan: bool,
    ) -> Option<FlushSnapshot> {
        if !self.inner.lock().insert(path.clone()) {
            return None;
        }
        Some(FlushSnapshot {
            destination: destination.to_string(),
            path,
            orphan,
            claims: self.clone(),
        })
    }

    pub(crate) fn is_claimed(&self, path: &Path) -> bool {
        self.inner.lock().contains(path)
    }

    fn release(&self, path: &Path) {
        self.inner.lock().remove(path);
    }
}

/// A rotated staging file, exclusively owned until dropped
///
/// Dropping the snapshot releases the claim but leaves the file alone; only
/// [`FlushSnapshot::remove`] deletes it.
#[derive(Debug)]
pub struct FlushSnapshot {
    destination: String,
    path: PathBuf,
    orphan: bool,
    claims: Claims,
}

impl FlushSnapshot {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Found by recovery rather than produced by a rotation
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }

    /// Whole snapshot contents; `None` if the file is already gone
    pub async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StagingError::io(&self.path, e)),
        }
    }

    /// Atomically replace the snapshot contents
    ///
    /// Writes a sibling temp file, syncs it and renames it over the snapshot.
    pub async fn replace(&self, contents: &str) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StagingError::io(&tmp, e))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| StagingError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| StagingError::io(&tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StagingError::io(&self.path, e))
    }

    /// Delete the snapshot file; already-missing files are fine
    pub async fn remove(self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StagingError::io(&self.path, e)),
        }
    }
}

impl Drop for FlushSnapshot {
    fn drop(&mut self) {
        self.claims.release(&self.path);
    }
}
