//! Broker abstraction

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::delivery::Delivery;
use crate::error::Result;

/// Queue health as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Messages ready for delivery
    pub messages: u32,
    /// Active consumers
    pub consumers: u32,
}

/// Stream of deliveries for one consumer tag
///
/// Yields `Err` once when the connection is lost, and `None` after the
/// subscription has been cancelled.
#[derive(Debug)]
pub struct Subscription {
    consumer_tag: String,
    receiver: mpsc::Receiver<Result<Delivery>>,
}

impl Subscription {
    pub fn new(consumer_tag: impl Into<String>, receiver: mpsc::Receiver<Result<Delivery>>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            receiver,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Next delivery
    pub async fn next(&mut self) -> Option<Result<Delivery>> {
        self.receiver.recv().await
    }
}

/// The broker seam
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Declare a durable queue (idempotent)
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Limit unacknowledged deliveries per consumer
    async fn set_prefetch(&self, prefetch: u16) -> Result<()>;

    /// Start consuming a queue under a consumer tag
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Subscription>;

    /// Stop a consumer; its subscription drains and ends
    async fn cancel(&self, consumer_tag: &str) -> Result<()>;

    /// Verify the connection and report queue depth
    async fn health_check(&self, queue: &str) -> Result<QueueStatus>;
}
