//! Broker errors

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors from the broker client
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Could not establish the connection
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// An established connection or channel went away
    #[error("broker connection lost: {0}")]
    ConnectionLost(String),

    /// Protocol-level failure reported by the AMQP client
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Acknowledgement could not be delivered
    #[error("acknowledgement failed for delivery {delivery_tag}: {message}")]
    AckFailed { delivery_tag: u64, message: String },
}

impl BrokerError {
    /// The session is unusable and the process should restart
    ///
    /// Every AMQP-level error closes its channel, so all of them count.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ConnectionLost(_) | Self::Amqp(_) | Self::AckFailed { .. }
        )
    }
}
