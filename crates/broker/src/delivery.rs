//! Deliveries and their acknowledgement handles

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Message headers with string values
pub type Headers = BTreeMap<String, String>;

/// Broker-specific acknowledgement transport
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;
    async fn reject(&self, requeue: bool) -> Result<()>;
}

/// Final state of a resolved delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Acked,
    Rejected { requeue: bool },
}

/// Acknowledgement handle of one delivery
///
/// Resolving consumes the handle, so a delivery can't be acked twice or
/// acked after a reject. A handle dropped unresolved leaves the message
/// unacknowledged; the broker redelivers it when the channel closes.
pub struct AckHandle {
    delivery_tag: u64,
    acker: Box<dyn Acknowledger>,
}

impl AckHandle {
    pub fn new(delivery_tag: u64, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            delivery_tag,
            acker,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Acknowledge the delivery
    pub async fn ack(self) -> Result<AckState> {
        self.acker.ack().await?;
        Ok(AckState::Acked)
    }

    /// Reject the delivery, optionally asking the broker to requeue it
    pub async fn reject(self, requeue: bool) -> Result<AckState> {
        self.acker.reject(requeue).await?;
        Ok(AckState::Rejected { requeue })
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("delivery_tag", &self.delivery_tag)
            .finish()
    }
}

/// One inbound message
#[derive(Debug)]
pub struct Delivery {
    pub content: Bytes,
    pub headers: Headers,
    /// Previously delivered and not acknowledged
    pub redelivered: bool,
    pub ack: AckHandle,
}

impl Delivery {
    /// Header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
