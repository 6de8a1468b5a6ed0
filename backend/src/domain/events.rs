//! Queue events and the topics they fan out to.
//!
//! Every committed mutation produces one [`QueueEvent`]. Events serialise as
//! `{"type": <kind>, "ticket": {...}}` or `{"type": "queue_status", "queue":
//! {...}}` so push transports can forward them without reshaping.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{PlaceId, QueueId, TicketId, UserId};
use super::queue::Queue;
use super::ticket::{Ticket, TicketStatus};

/// Discriminant of a [`QueueEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    TicketCreated,
    TicketLeft,
    TicketCalled,
    TicketRequeued,
    TicketCanceled,
    TicketCompleted,
    QueueStatus,
}

impl QueueEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TicketCreated => "ticket_created",
            Self::TicketLeft => "ticket_left",
            Self::TicketCalled => "ticket_called",
            Self::TicketRequeued => "ticket_requeued",
            Self::TicketCanceled => "ticket_canceled",
            Self::TicketCompleted => "ticket_completed",
            Self::QueueStatus => "queue_status",
        }
    }
}

impl fmt::Display for QueueEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialised view of a ticket inside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketSnapshot {
    pub ticket_id: TicketId,
    pub queue_id: QueueId,
    pub place_id: PlaceId,
    pub user_id: UserId,
    pub number: u32,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TicketSnapshot {
    /// Capture a ticket together with the place its queue belongs to.
    pub fn capture(ticket: &Ticket, place_id: PlaceId) -> Self {
        Self {
            ticket_id: *ticket.id(),
            queue_id: *ticket.queue_id(),
            place_id,
            user_id: *ticket.user_id(),
            number: ticket.number(),
            status: ticket.status(),
            cancel_reason: ticket.cancel_reason().map(str::to_owned),
            created_at: ticket.created_at(),
            called_at: ticket.called_at(),
            completed_at: ticket.completed_at(),
        }
    }
}

/// Serialised view of a queue inside a `queue_status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub queue_id: QueueId,
    pub place_id: PlaceId,
    pub name: String,
    pub is_open: bool,
    pub last_ticket_number: u32,
    pub total_tickets: u32,
    pub processed_count: u32,
    pub average_wait_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&Queue> for QueueSnapshot {
    fn from(queue: &Queue) -> Self {
        let stats = queue.statistics();
        Self {
            queue_id: *queue.id(),
            place_id: *queue.place_id(),
            name: queue.name().to_owned(),
            is_open: queue.is_open(),
            last_ticket_number: queue.last_ticket_number(),
            total_tickets: stats.total_tickets,
            processed_count: stats.processed_count,
            average_wait_seconds: stats.average_wait_time.num_seconds(),
            closed_at: queue.closed_at(),
        }
    }
}

/// A committed change, ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    TicketCreated { ticket: TicketSnapshot },
    TicketLeft { ticket: TicketSnapshot },
    TicketCalled { ticket: TicketSnapshot },
    TicketRequeued { ticket: TicketSnapshot },
    TicketCanceled { ticket: TicketSnapshot },
    TicketCompleted { ticket: TicketSnapshot },
    QueueStatus { queue: QueueSnapshot },
}

impl QueueEvent {
    /// Build a ticket event of the given kind.
    ///
    /// `QueueEventKind::QueueStatus` has no ticket payload; use
    /// [`QueueEvent::queue_status`] for it. Passing it here yields `None`.
    pub fn for_ticket(kind: QueueEventKind, ticket: &Ticket, place_id: PlaceId) -> Option<Self> {
        let ticket = TicketSnapshot::capture(ticket, place_id);
        match kind {
            QueueEventKind::TicketCreated => Some(Self::TicketCreated { ticket }),
            QueueEventKind::TicketLeft => Some(Self::TicketLeft { ticket }),
            QueueEventKind::TicketCalled => Some(Self::TicketCalled { ticket }),
            QueueEventKind::TicketRequeued => Some(Self::TicketRequeued { ticket }),
            QueueEventKind::TicketCanceled => Some(Self::TicketCanceled { ticket }),
            QueueEventKind::TicketCompleted => Some(Self::TicketCompleted { ticket }),
            QueueEventKind::QueueStatus => None,
        }
    }

    /// Build a `queue_status` event.
    pub fn queue_status(queue: &Queue) -> Self {
        Self::QueueStatus {
            queue: QueueSnapshot::from(queue),
        }
    }

    /// Discriminant used as the payload's `type`.
    pub const fn kind(&self) -> QueueEventKind {
        match self {
            Self::TicketCreated { .. } => QueueEventKind::TicketCreated,
            Self::TicketLeft { .. } => QueueEventKind::TicketLeft,
            Self::TicketCalled { .. } => QueueEventKind::TicketCalled,
            Self::TicketRequeued { .. } => QueueEventKind::TicketRequeued,
            Self::TicketCanceled { .. } => QueueEventKind::TicketCanceled,
            Self::TicketCompleted { .. } => QueueEventKind::TicketCompleted,
            Self::QueueStatus { .. } => QueueEventKind::QueueStatus,
        }
    }

    fn ticket(&self) -> Option<&TicketSnapshot> {
        match self {
            Self::TicketCreated { ticket }
            | Self::TicketLeft { ticket }
            | Self::TicketCalled { ticket }
            | Self::TicketRequeued { ticket }
            | Self::TicketCanceled { ticket }
            | Self::TicketCompleted { ticket } => Some(ticket),
            Self::QueueStatus { .. } => None,
        }
    }

    /// Place whose subscribers see the event.
    pub fn place_id(&self) -> PlaceId {
        match self {
            Self::QueueStatus { queue } => queue.place_id,
            Self::TicketCreated { ticket }
            | Self::TicketLeft { ticket }
            | Self::TicketCalled { ticket }
            | Self::TicketRequeued { ticket }
            | Self::TicketCanceled { ticket }
            | Self::TicketCompleted { ticket } => ticket.place_id,
        }
    }

    /// Topics the event is delivered to: the place topic first, then the
    /// holder's user topic for ticket events.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::place(&self.place_id())];
        if let Some(ticket) = self.ticket() {
            topics.push(Topic::user(&ticket.user_id));
        }
        topics
    }

    /// Serialise to the wire payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Named pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Topic for every subscriber watching a place.
    ///
    /// # Examples
    /// ```
    /// use smartqueue::domain::{PlaceId, Topic};
    ///
    /// let id = PlaceId::random();
    /// assert_eq!(Topic::place(&id).as_str(), format!("place:{id}"));
    /// ```
    pub fn place(place_id: &PlaceId) -> Self {
        Self(format!("place:{place_id}"))
    }

    /// Topic private to one user.
    pub fn user(user_id: &UserId) -> Self {
        Self(format!("user:{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
