//! Per-user notifications sent when a queue change concerns them directly.

use serde::Serialize;
use serde_json::{Value, json};

use super::ids::UserId;
use super::queue::Queue;
use super::ticket::Ticket;

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Websocket,
    Push,
    Email,
}

/// A message for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
    pub extra_data: Value,
    pub is_read: bool,
}

impl Notification {
    fn unread(user_id: UserId, title: &str, message: String, extra_data: Value) -> Self {
        Self {
            user_id,
            title: title.to_owned(),
            message,
            channel: NotificationChannel::Websocket,
            extra_data,
            is_read: false,
        }
    }

    /// The holder's ticket has been called to the counter.
    pub fn turn_called(ticket: &Ticket) -> Self {
        Self::unread(
            *ticket.user_id(),
            "It's your turn",
            format!("Ticket #{} has been called.", ticket.number()),
            json!({
                "ticket_id": ticket.id(),
                "queue_id": ticket.queue_id(),
                "number": ticket.number(),
            }),
        )
    }

    /// An operator canceled the holder's ticket.
    pub fn ticket_canceled(ticket: &Ticket) -> Self {
        let reason = ticket.cancel_reason().unwrap_or("canceled by staff");
        Self::unread(
            *ticket.user_id(),
            "Ticket canceled",
            format!("Ticket #{} was canceled: {reason}.", ticket.number()),
            json!({
                "ticket_id": ticket.id(),
                "queue_id": ticket.queue_id(),
                "reason": reason,
            }),
        )
    }

    /// The queue the holder waits in was opened or closed.
    pub fn queue_toggled(queue: &Queue, holder: UserId) -> Self {
        let state = if queue.is_open() { "reopened" } else { "closed" };
        Self::unread(
            holder,
            "Queue status changed",
            format!("Queue {} was {state}.", queue.name()),
            json!({
                "queue_id": queue.id(),
                "is_open": queue.is_open(),
            }),
        )
    }
}
