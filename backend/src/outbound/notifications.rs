//! Notification sink that records deliveries in the structured log.
//!
//! Stands in for push and email gateways until one is configured.

use async_trait::async_trait;
use tracing::info;

use crate::domain::Notification;
use crate::domain::ports::{NotificationError, NotificationSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let extra = serde_json::to_string(&notification.extra_data)
            .map_err(|err| NotificationError::rejected(err.to_string()))?;
        info!(
            user_id = %notification.user_id,
            channel = ?notification.channel,
            title = %notification.title,
            extra = %extra,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use super::*;
    use crate::domain::{QueueId, Ticket, TicketId, UserId};

    #[rstest]
    #[tokio::test]
    async fn logging_sink_accepts_notifications() {
        let ticket = Ticket::issue(TicketId::random(), QueueId::random(), UserId::random(), 3, Utc::now())
            .expect("valid ticket");
        TracingNotificationSink
            .deliver(&Notification::turn_called(&ticket))
            .await
            .expect("logged");
    }
}
