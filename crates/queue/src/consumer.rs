//! The inbound side: where forwarded gateway events come from.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueError;

/// One undecoded gateway-event delivery.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    /// Forwarded-event envelope, decoded by [`crate::parser`].
    pub body: String,
    /// Token passed back to `ack`/`nack`.
    pub receipt_handle: String,
    pub timestamp: DateTime<Utc>,
    /// Deliveries so far, this one included.
    pub attempt_count: u32,
}

/// Result of a startup connectivity check.
#[derive(Debug, Clone)]
pub struct QueueHealth {
    pub connected: bool,
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected { "connected" } else { "disconnected" };
        match self.approximate_message_count {
            Some(backlog) => write!(f, "{} {state}, ~{backlog} waiting", self.provider),
            None => write!(f, "{} {state}, backlog unknown", self.provider),
        }
    }
}

/// Source of gateway-event deliveries for [`crate::run_consumer`].
///
/// A message that is neither acked nor nacked becomes visible again once
/// the provider's visibility timeout runs out.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Receive up to `max_messages`; an empty batch is not an error.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// The message was handled and must not be delivered again.
    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Make the message visible again right away.
    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}
