//! Queues and their derived statistics.

use chrono::{DateTime, TimeDelta, Utc};

use super::ids::{PlaceId, QueueId};

/// How a caller addresses a queue: directly, or through its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTarget {
    /// The place's most recently created queue.
    Place(PlaceId),
    Queue(QueueId),
}

/// Derived counters stored alongside a queue.
///
/// Always recomputed from the queue's tickets, never incremented in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStatistics {
    /// Tickets that reached `used`.
    pub processed_count: u32,
    /// Tickets ever issued by the queue.
    pub total_tickets: u32,
    /// Mean of `completed_at - created_at` over used tickets.
    pub average_wait_time: TimeDelta,
}

/// Input payload for [`Queue::from_draft`], used when rehydrating from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDraft {
    pub id: QueueId,
    pub place_id: PlaceId,
    pub name: String,
    pub is_open: bool,
    pub last_ticket_number: u32,
    pub statistics: QueueStatistics,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A numbered line at a place.
///
/// ## Invariants
/// - `last_ticket_number` equals the highest number issued so far (0 before the
///   first join).
/// - `closed_at` is set exactly when the queue is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    id: QueueId,
    place_id: PlaceId,
    name: String,
    is_open: bool,
    last_ticket_number: u32,
    statistics: QueueStatistics,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl Queue {
    /// Create a fresh, open queue with no tickets.
    pub fn open(id: QueueId, place_id: PlaceId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            place_id,
            name: name.into(),
            is_open: true,
            last_ticket_number: 0,
            statistics: QueueStatistics::default(),
            created_at: now,
            closed_at: None,
        }
    }

    /// Rehydrate a queue from persisted fields.
    pub fn from_draft(draft: QueueDraft) -> Self {
        let QueueDraft {
            id,
            place_id,
            name,
            is_open,
            last_ticket_number,
            statistics,
            created_at,
            closed_at,
        } = draft;
        Self {
            id,
            place_id,
            name,
            is_open,
            last_ticket_number,
            statistics,
            created_at,
            closed_at: if is_open { None } else { closed_at },
        }
    }

    /// Queue identifier.
    pub const fn id(&self) -> &QueueId {
        &self.id
    }

    /// Place the queue belongs to.
    pub const fn place_id(&self) -> &PlaceId {
        &self.place_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue currently accepts joins.
    pub const fn is_open(&self) -> bool {
        self.is_open
    }

    /// Highest number issued so far; 0 for a fresh queue.
    pub const fn last_ticket_number(&self) -> u32 {
        self.last_ticket_number
    }

    /// Statistics as last recomputed from the ticket set.
    pub const fn statistics(&self) -> &QueueStatistics {
        &self.statistics
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the queue was last closed; `None` while open.
    pub const fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Flip the open flag, stamping or clearing `closed_at`.
    #[must_use]
    pub fn with_open_flag(mut self, is_open: bool, now: DateTime<Utc>) -> Self {
        if self.is_open != is_open {
            self.closed_at = if is_open { None } else { Some(now) };
        }
        self.is_open = is_open;
        self
    }

    /// Record a newly issued ticket number.
    #[must_use]
    pub fn with_issued_number(mut self, number: u32) -> Self {
        self.last_ticket_number = self.last_ticket_number.max(number);
        self
    }

    /// Replace the stored statistics.
    #[must_use]
    pub fn with_statistics(mut self, statistics: QueueStatistics) -> Self {
        self.statistics = statistics;
        self
    }
}
