//! Staging errors

use std::path::PathBuf;

/// Result type for staging operations
pub type Result<T> = std::result::Result<T, StagingError>;

/// Errors from the staging area
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// Filesystem operation failed
    #[error("staging I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination name can't be used as a file name
    #[error("invalid destination name '{0}'")]
    InvalidDestination(String),

    /// The staging area no longer accepts appends
    #[error("staging area is closed")]
    Closed,
}

impl StagingError {
    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Underlying error is "file not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = StagingError::io(
            "/tmp/events.sql",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/events.sql"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found() {
        let err = StagingError::io("x", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.is_not_found());
    }
}
