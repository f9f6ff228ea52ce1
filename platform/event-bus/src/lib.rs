//! # EventBus Abstraction
//!
//! Publish/subscribe messaging shared by the settlement service: the inbound
//! `orders.events.delivered` trigger arrives through it, and the outbound
//! `wallet.events.*` notifications leave through it.
//!
//! ## Implementations
//!
//! - **NatsBus**: production implementation over a NATS connection
//! - **InMemoryBus**: in-process implementation for development and tests
//!
//! The two are swapped by configuration (`BUS_TYPE`), so every consumer and
//! publisher is written against the trait only.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let nats_client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::new(nats_client));
//!
//! // Dev/Test: in-memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! let payload = serde_json::to_vec(&serde_json::json!({
//!     "order_id": "ord_1029",
//! }))?;
//! bus.publish("orders.events.delivered", payload).await?;
//!
//! let mut stream = bus.subscribe("wallet.events.>").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("received {} bytes on {}", msg.payload.len(), msg.subject);
//! }
//! # Ok(())
//! # }
//! ```

mod envelope;
mod inmemory_bus;
mod nats_bus;

pub mod consumer_retry;

pub use envelope::{validate_envelope_fields, EventEnvelope};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject this message was published to
    pub subject: String,
    /// The message payload (raw bytes, usually a JSON envelope)
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self { subject, payload }
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core publish-subscribe abstraction
///
/// Subjects are dot-separated (`orders.events.delivered`,
/// `wallet.events.balance.updated`); subscription patterns support NATS
/// wildcards (`*` for one token, `>` for one or more trailing tokens).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages matching a subject pattern
    ///
    /// # Example
    /// ```rust,no_run
    /// # use event_bus::{EventBus, InMemoryBus};
    /// # use futures::StreamExt;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let bus = InMemoryBus::new();
    /// let mut stream = bus.subscribe("wallet.events.>").await?;
    /// while let Some(msg) = stream.next().await {
    ///     // Process message
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
