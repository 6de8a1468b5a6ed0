//! Port for delivering committed queue events to topic subscribers.

use async_trait::async_trait;

use crate::domain::{QueueEvent, Topic};

use super::define_port_error;

define_port_error! {
    /// Errors raised by event publisher adapters.
    pub enum PublishError {
        /// Nobody is listening on the topic.
        NoSubscribers { topic: String } => "no subscribers on {topic}",
        /// The event could not be encoded for the wire.
        Encode { message: String } => "event encoding failed: {message}",
        /// The transport rejected the delivery.
        Transport { message: String } => "event delivery failed: {message}",
    }
}

/// Port for publishing one event to one topic.
///
/// Delivery is at-most-once. The engine logs failures and moves on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &Topic, event: &QueueEvent) -> Result<(), PublishError>;
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureEventPublisher;

#[async_trait]
impl EventPublisher for FixtureEventPublisher {
    async fn publish(&self, _topic: &Topic, _event: &QueueEvent) -> Result<(), PublishError> {
        Ok(())
    }
}
