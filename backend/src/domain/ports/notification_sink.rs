//! Port for per-user notifications emitted alongside queue events.

use async_trait::async_trait;

use crate::domain::Notification;

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification sink adapters.
    pub enum NotificationError {
        /// The delivery channel is unavailable.
        Unavailable { message: String } => "notification channel unavailable: {message}",
        /// The channel rejected the notification.
        Rejected { message: String } => "notification rejected: {message}",
    }
}

/// Port for delivering notifications to users.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureNotificationSink;

#[async_trait]
impl NotificationSink for FixtureNotificationSink {
    async fn deliver(&self, _notification: &Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}
