//! AMQP 0-9-1 broker via lapin
//!
//! One connection and one channel per broker. Each consumer runs a task
//! that forwards the lapin consumer stream into its [`Subscription`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{Broker, QueueStatus, Subscription};
use crate::delivery::{AckHandle, Acknowledger, Delivery, Headers};
use crate::error::{BrokerError, Result};

const SUBSCRIPTION_BUFFER: usize = 64;

/// Broker speaking AMQP 0-9-1
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    cancelling: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl AmqpBroker {
    /// Connect and open a channel
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        info!(channel = channel.id(), "connected to broker");

        Ok(Self {
            connection,
            channel,
            cancelling: Mutex::new(HashMap::new()),
        })
    }

    /// Close the connection; the broker requeues anything still unacked
    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "closing").await {
            debug!(error = %e, "broker connection close failed");
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connection.status().connected() || !self.channel.status().connected() {
            return Err(BrokerError::ConnectionLost(
                "connection or channel closed".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpBroker")
            .field("channel", &self.channel.id())
            .finish()
    }
}

/// String-valued headers; other AMQP value types are skipped
fn convert_headers(table: Option<&FieldTable>) -> Headers {
    let Some(table) = table else {
        return Headers::new();
    };
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                AMQPValue::ShortString(s) => s.as_str().to_string(),
                _ => return None,
            };
            Some((key.as_str().to_string(), value))
        })
        .collect()
}

struct LapinAcker {
    delivery_tag: u64,
    acker: Acker,
}

impl LapinAcker {
    fn failed(&self, e: lapin::Error) -> BrokerError {
        BrokerError::AckFailed {
            delivery_tag: self.delivery_tag,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Acknowledger for LapinAcker {
    async fn ack(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| self.failed(e))
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| self.failed(e))
    }
}

async fn forward(
    mut consumer: lapin::Consumer,
    consumer_tag: String,
    cancelling: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<Delivery>>,
) {
    while let Some(next) = consumer.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                warn!(consumer_tag = %consumer_tag, error = %e, "consumer stream failed");
                let _ = tx.send(Err(BrokerError::ConnectionLost(e.to_string()))).await;
                return;
            }
        };

        let delivery = Delivery {
            content: Bytes::from(message.data),
            headers: convert_headers(message.properties.headers().as_ref()),
            redelivered: message.redelivered,
            ack: AckHandle::new(
                message.delivery_tag,
                Box::new(LapinAcker {
                    delivery_tag: message.delivery_tag,
                    acker: message.acker,
                }),
            ),
        };

        if tx.send(Ok(delivery)).await.is_err() {
            return;
        }
    }

    if cancelling.load(Ordering::SeqCst) {
        debug!(consumer_tag = %consumer_tag, "consumer cancelled");
    } else {
        let _ = tx
            .send(Err(BrokerError::ConnectionLost(
                "consumer stream ended".into(),
            )))
            .await;
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn set_prefetch(&self, prefetch: u16) -> Result<()> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Subscription> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let cancelling = Arc::new(AtomicBool::new(false));
        self.cancelling
            .lock()
            .insert(consumer_tag.to_string(), Arc::clone(&cancelling));

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(forward(consumer, consumer_tag.to_string(), cancelling, tx));

        info!(queue, consumer_tag, "consuming");
        Ok(Subscription::new(consumer_tag, rx))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        let Some(flag) = self.cancelling.lock().remove(consumer_tag) else {
            return Ok(());
        };
        flag.store(true, Ordering::SeqCst);
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }

    async fn health_check(&self, queue: &str) -> Result<QueueStatus> {
        self.ensure_connected()?;
        let options = QueueDeclareOptions {
            passive: true,
            ..QueueDeclareOptions::default()
        };
        let status = self
            .channel
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(QueueStatus {
            messages: status.message_count(),
            consumers: status.consumer_count(),
        })
    }
}
