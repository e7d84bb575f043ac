//! Staging directory configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Local staging area configuration
///
/// Each process needs its own staging directory; two processes appending to
/// the same directory are not serialized against each other.
///
/// # Example
///
/// ```toml
/// [staging]
/// path = "/var/lib/chq"
/// fsync = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory holding staging files and rotated snapshots
    /// Default: "tmp"
    pub path: PathBuf,

    /// Sync file data to disk after every append, before the broker ack
    /// Default: true
    pub fsync: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tmp"),
            fsync: true,
        }
    }
}
