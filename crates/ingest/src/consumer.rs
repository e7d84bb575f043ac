//! Ingestion loop
//!
//! Each delivery runs as its own task:
//!
//! ```text
//! received ─► decoded ─► coerced ─► appended ─► acked
//!     │          │          │
//!     └──────────┴──────────┴─► rejected (after reject_delay)
//! ```
//!
//! At most `prefetch` tasks run at once. Per-message failures reject the
//! delivery; broker connection loss, failed acknowledgements and an
//! unreachable store during introspection end the loop.

use std::sync::Arc;

use chq_broker::{AckHandle, AckState, Broker, Delivery};
use chq_config::BrokerConfig;
use chq_flush::{Backoff, FlushScheduler};
use chq_staging::StagingArea;
use chq_store::ValueCoercer;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decode::decode;
use crate::error::IngestError;
use crate::metrics::IngestMetrics;

/// Longest body excerpt included in a log line
const MAX_LOGGED_BODY_CHARS: usize = 255;

/// Consumes the broker queue into the staging area
pub struct IngestionLoop {
    broker: Arc<dyn Broker>,
    coercer: Arc<ValueCoercer>,
    scheduler: Arc<FlushScheduler>,
    config: BrokerConfig,
    metrics: Arc<IngestMetrics>,
}

impl IngestionLoop {
    pub fn new(
        broker: Arc<dyn Broker>,
        coercer: Arc<ValueCoercer>,
        scheduler: Arc<FlushScheduler>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            broker,
            coercer,
            scheduler,
            config: config.clone(),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    fn staging(&self) -> &Arc<StagingArea> {
        self.scheduler.staging()
    }

    // =========================================================================
    // Loop
    // =========================================================================

    /// Consume until cancelled or a fatal error
    ///
    /// On return the subscription is cancelled and every in-flight message
    /// has been acked or rejected.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), IngestError> {
        let queue = self.config.queue.clone();
        let consumer_tag = self.config.consumer_tag();

        self.broker.declare_queue(&queue).await?;
        self.broker.set_prefetch(self.config.prefetch).await?;
        let mut subscription = self.broker.consume(&queue, &consumer_tag).await?;

        info!(
            queue = %queue,
            consumer_tag = %consumer_tag,
            prefetch = self.config.prefetch,
            "ingestion started"
        );

        let limit = usize::from(self.config.prefetch.max(1));
        let mut tasks: JoinSet<Result<AckState, IngestError>> = JoinSet::new();

        let mut fatal = loop {
            if tasks.len() >= limit {
                if let Some(joined) = tasks.join_next().await
                    && let Err(e) = flatten(joined)
                {
                    break Some(e);
                }
                continue;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break None,

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = flatten(joined) {
                        break Some(e);
                    }
                }

                next = subscription.next() => match next {
                    Some(Ok(delivery)) => {
                        let this = Arc::clone(&self);
                        tasks.spawn(async move { this.handle(delivery).await });
                    }
                    Some(Err(e)) => break Some(IngestError::Broker(e)),
                    None => break Some(IngestError::SubscriptionEnded),
                },
            }
        };

        if let Err(e) = self.broker.cancel(&consumer_tag).await {
            debug!(consumer_tag = %consumer_tag, error = %e, "subscription cancel failed");
        }
        drop(subscription);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = flatten(joined)
                && fatal.is_none()
            {
                fatal = Some(e);
            }
        }

        let Some(e) = fatal else {
            info!(consumer_tag = %consumer_tag, "ingestion stopped");
            return Ok(());
        };

        error!(error = %e, "ingestion failed");
        if e.is_broker_connection() {
            let delay = Backoff::Fixed(self.config.reconnect_backoff).delay(0);
            warn!(delay_ms = delay.as_millis() as u64, "backing off before exit");
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Err(e)
    }

    // =========================================================================
    // Per-message
    // =========================================================================

    async fn handle(&self, delivery: Delivery) -> Result<AckState, IngestError> {
        self.metrics.record_received();
        let Delivery {
            content,
            headers,
            redelivered,
            ack,
        } = delivery;

        let record = match decode(&content, &headers, &self.config.destination_header) {
            Ok(record) => record,
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(
                    error = %e,
                    redelivered,
                    body = %excerpt(&content),
                    "undecodable message"
                );
                return self.reject(ack, self.config.requeue_rejected).await;
            }
        };
        let destination = record.destination.as_str();

        let row = match self.coercer.coerce_record(&record).await {
            Ok(row) => row,
            Err(e) if e.is_connection() => {
                return Err(IngestError::StoreUnavailable {
                    destination: destination.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                self.metrics.record_coercion_error();
                warn!(
                    destination = %destination,
                    error = %e,
                    fields = %serde_json::Value::Object(record.fields.clone()),
                    "record rejected"
                );
                return self.reject(ack, self.config.requeue_rejected).await;
            }
        };

        if let Err(e) = self.staging().append(destination, &row).await {
            self.metrics.record_staging_error();
            error!(destination = %destination, error = %e, "append failed, requeueing");
            return self.reject(ack, true).await;
        }

        let state = ack.ack().await?;
        self.metrics.record_acked();

        if self.scheduler.eligible(destination) {
            self.metrics.record_flush_triggered();
            self.scheduler.spawn_flush(destination);
        }
        Ok(state)
    }

    async fn reject(&self, ack: AckHandle, requeue: bool) -> Result<AckState, IngestError> {
        tokio::time::sleep(self.config.reject_delay).await;
        let state = ack.reject(requeue).await?;
        self.metrics.record_rejected();
        Ok(state)
    }
}

impl std::fmt::Debug for IngestionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionLoop")
            .field("queue", &self.config.queue)
            .field("prefetch", &self.config.prefetch)
            .finish()
    }
}

fn flatten(
    joined: Result<Result<AckState, IngestError>, tokio::task::JoinError>,
) -> Result<AckState, IngestError> {
    joined?
}

fn excerpt(content: &[u8]) -> String {
    String::from_utf8_lossy(content)
        .chars()
        .take(MAX_LOGGED_BODY_CHARS)
        .collect()
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod consumer_test;
