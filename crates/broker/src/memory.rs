//! In-process broker
//!
//! Queues live in memory. Deliveries respect the prefetch limit, unacked
//! messages are requeued (marked redelivered) when the broker is
//! disconnected, and resolved messages are recorded so tests can assert on
//! them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::client::{Broker, QueueStatus, Subscription};
use crate::delivery::{AckHandle, Acknowledger, Delivery, Headers};
use crate::error::{BrokerError, Result};

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Debug, Clone)]
struct Message {
    content: Bytes,
    headers: Headers,
    redelivered: bool,
}

#[derive(Debug)]
struct Consumer {
    queue: String,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    unacked: Mutex<HashMap<u64, (String, Message)>>,
    consumers: Mutex<HashMap<String, Consumer>>,
    acked: Mutex<Vec<Bytes>>,
    rejected: Mutex<Vec<(Bytes, bool)>>,
    notify: Notify,
    prefetch: AtomicU16,
    disconnected: AtomicBool,
    next_tag: AtomicU64,
}

impl Inner {
    fn check_connected(&self) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionLost("memory broker disconnected".into()));
        }
        Ok(())
    }

    fn pop(&self, queue: &str) -> Option<(u64, Message)> {
        let message = self.queues.lock().get_mut(queue)?.pop_front()?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        self.unacked
            .lock()
            .insert(tag, (queue.to_string(), message.clone()));
        Some((tag, message))
    }

    fn requeue(&self, queue: &str, mut message: Message) {
        message.redelivered = true;
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_front(message);
        self.notify.notify_waiters();
    }
}

/// Broker backed by in-memory queues
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message
    pub fn publish(&self, queue: &str, content: impl Into<Bytes>, headers: Headers) {
        self.inner
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(Message {
                content: content.into(),
                headers,
                redelivered: false,
            });
        self.inner.notify.notify_waiters();
    }

    /// Messages waiting for delivery
    pub fn ready(&self, queue: &str) -> usize {
        self.inner.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    /// Delivered but unresolved messages
    pub fn unacked(&self) -> usize {
        self.inner.unacked.lock().len()
    }

    /// Contents of acknowledged messages, in order
    pub fn acked(&self) -> Vec<Bytes> {
        self.inner.acked.lock().clone()
    }

    /// Contents and requeue flag of rejected messages, in order
    pub fn rejected(&self) -> Vec<(Bytes, bool)> {
        self.inner.rejected.lock().clone()
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.inner.queues.lock().contains_key(queue)
    }

    pub fn prefetch(&self) -> u16 {
        self.inner.prefetch.load(Ordering::SeqCst)
    }

    /// Drop the connection: subscriptions fail and unacked messages return to their queues
    pub fn disconnect(&self) {
        self.inner.disconnected.store(true, Ordering::SeqCst);
        let mut unacked: Vec<(u64, (String, Message))> = self.inner.unacked.lock().drain().collect();
        // push_front in reverse tag order keeps the original delivery order
        unacked.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, (queue, message)) in unacked {
            self.inner.requeue(&queue, message);
        }
        self.inner.notify.notify_waiters();
    }

    /// Accept operations again after [`MemoryBroker::disconnect`]
    pub fn reconnect(&self) {
        self.inner.disconnected.store(false, Ordering::SeqCst);
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    tag: u64,
    _permit: OwnedSemaphorePermit,
}

impl MemoryAcker {
    fn take(&self) -> Result<(String, Message)> {
        self.inner.check_connected().map_err(|e| BrokerError::AckFailed {
            delivery_tag: self.tag,
            message: e.to_string(),
        })?;
        self.inner
            .unacked
            .lock()
            .remove(&self.tag)
            .ok_or_else(|| BrokerError::AckFailed {
                delivery_tag: self.tag,
                message: "unknown delivery tag".into(),
            })
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        let (_, message) = self.take()?;
        self.inner.acked.lock().push(message.content);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        let (queue, message) = self.take()?;
        self.inner
            .rejected
            .lock()
            .push((message.content.clone(), requeue));
        if requeue {
            self.inner.requeue(&queue, message);
        }
        Ok(())
    }
}

async fn run_consumer(
    inner: Arc<Inner>,
    queue: String,
    prefetch: u16,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<Delivery>>,
) {
    let limit = if prefetch == 0 {
        Semaphore::MAX_PERMITS
    } else {
        usize::from(prefetch)
    };
    let permits = Arc::new(Semaphore::new(limit));

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let (tag, message) = loop {
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Err(e) = inner.check_connected() {
                let _ = tx.send(Err(e)).await;
                return;
            }
            if let Some(next) = inner.pop(&queue) {
                break next;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = notified => {}
            }
        };

        let delivery = Delivery {
            content: message.content,
            headers: message.headers,
            redelivered: message.redelivered,
            ack: AckHandle::new(
                tag,
                Box::new(MemoryAcker {
                    inner: Arc::clone(&inner),
                    tag,
                    _permit: permit,
                }),
            ),
        };

        if tx.send(Ok(delivery)).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.inner.check_connected()?;
        self.inner
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn set_prefetch(&self, prefetch: u16) -> Result<()> {
        self.inner.check_connected()?;
        self.inner.prefetch.store(prefetch, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Subscription> {
        self.inner.check_connected()?;
        if !self.is_declared(queue) {
            return Err(BrokerError::ConnectionLost(format!(
                "NOT_FOUND - no queue '{queue}'"
            )));
        }

        let cancel = CancellationToken::new();
        self.inner.consumers.lock().insert(
            consumer_tag.to_string(),
            Consumer {
                queue: queue.to_string(),
                cancel: cancel.clone(),
            },
        );

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(run_consumer(
            Arc::clone(&self.inner),
            queue.to_string(),
            self.prefetch(),
            cancel,
            tx,
        ));

        Ok(Subscription::new(consumer_tag, rx))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        if let Some(consumer) = self.inner.consumers.lock().remove(consumer_tag) {
            consumer.cancel.cancel();
        }
        Ok(())
    }

    async fn health_check(&self, queue: &str) -> Result<QueueStatus> {
        self.inner.check_connected()?;
        let consumers = self
            .inner
            .consumers
            .lock()
            .values()
            .filter(|c| c.queue == queue)
            .count();
        Ok(QueueStatus {
            messages: self.ready(queue) as u32,
            consumers: consumers as u32,
        })
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
