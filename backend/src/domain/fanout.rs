//! Post-commit delivery of events and notifications.
//!
//! Runs strictly after the store confirmed a mutation. Delivery failures are
//! logged and discarded; they never undo or fail the committed operation.

use std::sync::Arc;

use tracing::{debug, warn};

use super::events::QueueEvent;
use super::notifications::Notification;
use super::ports::{EventPublisher, NotificationSink, PublishError};

/// Publishes committed events to their topics and hands notifications to
/// the sink.
#[derive(Clone)]
pub struct EventFanout {
    publisher: Arc<dyn EventPublisher>,
    notifications: Arc<dyn NotificationSink>,
}

impl EventFanout {
    /// Build a fan-out over the given transport and sink.
    pub fn new(publisher: Arc<dyn EventPublisher>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            publisher,
            notifications,
        }
    }

    /// Publish to the place topic, then the holder's user topic.
    pub async fn publish(&self, event: &QueueEvent) {
        for topic in event.topics() {
            match self.publisher.publish(&topic, event).await {
                Ok(()) => {}
                Err(PublishError::NoSubscribers { .. }) => {
                    debug!(%topic, kind = %event.kind(), "no subscribers for event");
                }
                Err(error) => {
                    warn!(%topic, kind = %event.kind(), error = %error, "event delivery failed");
                }
            }
        }
    }

    /// Deliver notifications one by one.
    pub async fn notify(&self, notifications: &[Notification]) {
        for notification in notifications {
            if let Err(error) = self.notifications.deliver(notification).await {
                warn!(
                    user_id = %notification.user_id,
                    error = %error,
                    error_kind = error.kind(),
                    "notification delivery failed"
                );
            }
        }
    }
}
