//! Message bus contracts shared by the services.
//!
//! Publishing is async and fire-and-forget. Consuming goes through a
//! [`MessageSource`], a blocking handle that is polled from a dedicated thread
//! and committed explicitly once the message has been processed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to publish to {topic}: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Failed to subscribe to {topic}: {reason}")]
    SubscriptionFailed { topic: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to commit offset: {0}")]
    Commit(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand a payload to the producer. `Ok` means accepted for delivery.
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError>;
}

/// Serialize `event` as JSON and publish it under `key`.
pub async fn publish_event<E>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &E,
) -> Result<(), BusError>
where
    E: Serialize + Sync,
{
    let payload = serde_json::to_string(event).map_err(|e| BusError::PublishFailed {
        topic: topic.to_string(),
        reason: format!("serialization failed: {}", e),
    })?;
    publisher.publish(topic, key, &payload).await
}

/// A message as read from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| BusError::Decode("message has no payload".to_string()))?;
        serde_json::from_slice(payload).map_err(|e| BusError::Decode(e.to_string()))
    }
}

/// Blocking consumer handle. Owned by exactly one poll thread.
pub trait MessageSource: Send + 'static {
    /// Wait up to `timeout` for the next message.
    fn poll(&mut self, timeout: Duration) -> Option<Result<InboundMessage, BusError>>;

    /// Mark `message` (and everything before it in its partition) as processed.
    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError>;

    /// Reposition so that `message` is delivered again.
    fn rewind(&mut self, message: &InboundMessage) -> Result<(), BusError>;

    fn close(&mut self) {}
}
