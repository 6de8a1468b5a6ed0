//! Tickets, their lifecycle status and the change set applied on transition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{QueueId, TicketId, UserId};

/// Lifecycle status of a ticket.
///
/// `active` and `called` are outstanding. `used` and `canceled` are terminal
/// and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Called,
    Used,
    Canceled,
}

impl TicketStatus {
    /// Statuses that still hold a place in the queue.
    pub const OUTSTANDING: [Self; 2] = [Self::Active, Self::Called];

    /// Stable storage and wire identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Called => "called",
            Self::Used => "used",
            Self::Canceled => "canceled",
        }
    }

    /// `used` and `canceled` admit no further transition.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Canceled)
    }

    /// Whether the ticket still holds a place in line.
    pub const fn is_outstanding(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status: {0}")]
pub struct ParseTicketStatusError(pub String);

impl FromStr for TicketStatus {
    type Err = ParseTicketStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "called" => Ok(Self::Called),
            "used" => Ok(Self::Used),
            "canceled" => Ok(Self::Canceled),
            other => Err(ParseTicketStatusError(other.to_owned())),
        }
    }
}

/// Validation errors raised by [`Ticket::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketValidationError {
    #[error("ticket numbers start at 1")]
    ZeroNumber,
    #[error("{status} ticket is missing called_at")]
    MissingCalledAt { status: TicketStatus },
    #[error("{status} ticket is missing completed_at")]
    MissingCompletedAt { status: TicketStatus },
    #[error("{status} ticket must not carry completed_at")]
    UnexpectedCompletedAt { status: TicketStatus },
}

/// Input payload for [`Ticket::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    pub id: TicketId,
    pub queue_id: QueueId,
    pub user_id: UserId,
    pub number: u32,
    pub status: TicketStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A numbered claim on a place in one queue, held by one user.
///
/// ## Invariants
/// - `number >= 1` and unique within its queue.
/// - `called` tickets carry `called_at`.
/// - Terminal tickets carry `completed_at`; outstanding ones do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: TicketId,
    queue_id: QueueId,
    user_id: UserId,
    number: u32,
    status: TicketStatus,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Validate a draft against the lifecycle invariants.
    pub fn new(draft: TicketDraft) -> Result<Self, TicketValidationError> {
        let TicketDraft {
            id,
            queue_id,
            user_id,
            number,
            status,
            cancel_reason,
            created_at,
            called_at,
            completed_at,
        } = draft;

        if number == 0 {
            return Err(TicketValidationError::ZeroNumber);
        }
        if status == TicketStatus::Called && called_at.is_none() {
            return Err(TicketValidationError::MissingCalledAt { status });
        }
        match (status.is_terminal(), completed_at.is_some()) {
            (true, false) => return Err(TicketValidationError::MissingCompletedAt { status }),
            (false, true) => return Err(TicketValidationError::UnexpectedCompletedAt { status }),
            _ => {}
        }

        Ok(Self {
            id,
            queue_id,
            user_id,
            number,
            status,
            cancel_reason,
            created_at,
            called_at,
            completed_at,
        })
    }

    /// Issue a fresh active ticket.
    pub fn issue(
        id: TicketId,
        queue_id: QueueId,
        user_id: UserId,
        number: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TicketValidationError> {
        Self::new(TicketDraft {
            id,
            queue_id,
            user_id,
            number,
            status: TicketStatus::Active,
            cancel_reason: None,
            created_at,
            called_at: None,
            completed_at: None,
        })
    }

    /// Ticket identifier.
    pub const fn id(&self) -> &TicketId {
        &self.id
    }

    /// Queue that issued the ticket.
    pub const fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    /// Holder of the ticket.
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Sequence number within the queue.
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Current lifecycle status.
    pub const fn status(&self) -> TicketStatus {
        self.status
    }

    /// Reason recorded when the ticket was canceled.
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// When the ticket was issued.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the ticket was last called, cleared by a requeue.
    pub const fn called_at(&self) -> Option<DateTime<Utc>> {
        self.called_at
    }

    /// When the ticket reached a terminal status.
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Apply a change set, producing the post-transition ticket.
    ///
    /// The caller is responsible for having checked the current status against
    /// the change's expected set.
    #[must_use]
    pub fn apply(&self, change: &TicketChange) -> Self {
        Self {
            status: change.status,
            called_at: change.called_at.apply(self.called_at),
            completed_at: change.completed_at.apply(self.completed_at),
            cancel_reason: change.cancel_reason.apply(self.cancel_reason.clone()),
            ..self.clone()
        }
    }
}

/// How one nullable field changes during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    /// Leave the stored value untouched.
    #[default]
    Keep,
    /// Overwrite with a new value.
    Set(T),
    /// Reset to null.
    Clear,
}

impl<T: Clone> FieldUpdate<T> {
    /// Resolve the update against the current value.
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            Self::Keep => current,
            Self::Set(value) => Some(value.clone()),
            Self::Clear => None,
        }
    }

    /// Express the update as a "maybe assign nullable" pair: `None` skips
    /// the column, `Some(None)` writes null.
    pub fn as_assignment(&self) -> Option<Option<T>> {
        match self {
            Self::Keep => None,
            Self::Set(value) => Some(Some(value.clone())),
            Self::Clear => Some(None),
        }
    }
}

/// The new status and field updates a compare-and-set writes atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketChange {
    pub status: TicketStatus,
    pub called_at: FieldUpdate<DateTime<Utc>>,
    pub completed_at: FieldUpdate<DateTime<Utc>>,
    pub cancel_reason: FieldUpdate<String>,
}

impl TicketChange {
    /// Change only the status.
    pub const fn status_only(status: TicketStatus) -> Self {
        Self {
            status,
            called_at: FieldUpdate::Keep,
            completed_at: FieldUpdate::Keep,
            cancel_reason: FieldUpdate::Keep,
        }
    }
}
