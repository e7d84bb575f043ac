//! chq - Broker
//!
//! The consuming side of a message broker: declare a durable queue, limit
//! unacknowledged deliveries, subscribe, and resolve each delivery exactly
//! once.
//!
//! # Brokers
//!
//! | Broker | Purpose |
//! |--------|---------|
//! | `AmqpBroker` | AMQP 0-9-1 via `lapin` |
//! | `MemoryBroker` | In-process queues for embedding and tests |

mod amqp;
mod client;
mod delivery;
mod error;
pub mod memory;

pub use amqp::AmqpBroker;
pub use client::{Broker, QueueStatus, Subscription};
pub use delivery::{AckHandle, AckState, Acknowledger, Delivery, Headers};
pub use error::{BrokerError, Result};
pub use memory::MemoryBroker;
