//! Store and coercion errors

/// ClickHouse error code for a column the table doesn't have
const NO_SUCH_COLUMN_CODE: &str = "Code: 16.";

/// Errors from the store client
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP transport failure (connect, timeout, reset)
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-2xx status
    #[error("store rejected request (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error body returned by the store
        body: String,
    },

    /// Store is not reachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Introspection response could not be understood
    #[error("invalid schema for '{table}': {message}")]
    InvalidSchema {
        /// Table being described
        table: String,
        /// What was wrong
        message: String,
    },
}

impl StoreError {
    /// Connection-class failure: the session to the store can't be trusted
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }

    /// The store rejected a statement because a column doesn't exist
    pub fn is_unknown_column(&self) -> bool {
        match self {
            Self::Rejected { body, .. } => {
                body.contains(NO_SUCH_COLUMN_CODE) || body.contains("NO_SUCH_COLUMN_IN_TABLE")
            }
            _ => false,
        }
    }

    /// Worth retrying in place (transport errors and server-side 5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status >= 500 && !self.is_unknown_column(),
            Self::InvalidSchema { .. } => false,
        }
    }
}

/// Errors converting a raw value into a store literal
#[derive(Debug, thiserror::Error)]
pub enum CoercionError {
    /// Field names a column the destination doesn't have
    #[error("unknown column '{column}' in destination '{destination}'")]
    UnknownColumn {
        /// Destination table
        destination: String,
        /// Offending field
        column: String,
    },

    /// Column is computed by the store (MATERIALIZED / ALIAS)
    #[error("column '{column}' in destination '{destination}' is not insertable")]
    NotInsertable {
        /// Destination table
        destination: String,
        /// Offending field
        column: String,
    },

    /// A non-empty array or object where a scalar is required
    #[error("non-scalar value for column '{column}'")]
    NonScalar {
        /// Offending field
        column: String,
    },

    /// Schema lookup failed
    #[error("schema lookup failed: {0}")]
    Schema(#[from] StoreError),
}

impl CoercionError {
    /// Schema lookup failed on a connection-class store error
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Schema(e) if e.is_connection())
    }
}
