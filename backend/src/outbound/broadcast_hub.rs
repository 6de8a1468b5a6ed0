//! In-process topic fan-out over `tokio::sync::broadcast`.
//!
//! Each topic owns one broadcast channel carrying the event's JSON payload.
//! Socket sessions call [`BroadcastHub::subscribe`] for `place:{id}` and
//! `user:{id}` topics and forward what they receive. Receivers that fall
//! behind see `Lagged` and miss events; delivery is at-most-once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::domain::ports::{EventPublisher, PublishError};
use crate::domain::{QueueEvent, Topic};

/// Encoded event as delivered to subscribers.
pub type EventPayload = Arc<str>;

/// Topic-keyed broadcast channels.
#[derive(Debug)]
pub struct BroadcastHub {
    capacity: usize,
    topics: RwLock<HashMap<Topic, broadcast::Sender<EventPayload>>>,
}

impl BroadcastHub {
    /// Create a hub whose per-topic buffers hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Start receiving events published to `topic`.
    pub async fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<EventPayload> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Live receivers on `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    async fn prune(&self, topic: &Topic) {
        let mut topics = self.topics.write().await;
        if topics
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(topic);
            debug!(%topic, "pruned idle topic");
        }
    }
}

#[async_trait]
impl EventPublisher for BroadcastHub {
    async fn publish(&self, topic: &Topic, event: &QueueEvent) -> Result<(), PublishError> {
        let payload: EventPayload = event
            .to_json()
            .map_err(|err| PublishError::encode(err.to_string()))?
            .into();

        let sent = match self.topics.read().await.get(topic) {
            Some(sender) => sender.send(payload).ok(),
            None => return Err(PublishError::no_subscribers(topic.as_str())),
        };

        match sent {
            Some(receivers) => {
                debug!(%topic, receivers, kind = event.kind().as_str(), "event broadcast");
                Ok(())
            }
            None => {
                self.prune(topic).await;
                Err(PublishError::no_subscribers(topic.as_str()))
            }
        }
    }
}
