//! Ticket lifecycle rules.
//!
//! ```text
//!            call              complete
//!   active ───────▶ called ─────────────▶ used
//!     ▲  │           │  │
//!     │  │  requeue  │  │ cancel / leave
//!     │  │◀──────────┘  ▼
//!     │  └─────────▶ canceled
//!     └ join      cancel / leave
//! ```
//!
//! Planning is pure: [`TicketAction::plan`] inspects a ticket snapshot and
//! returns the status set a compare-and-set must observe plus the change to
//! write. The queue engine feeds the plan to the store and re-plans when a
//! concurrent writer wins.

use chrono::{DateTime, Utc};

use super::events::QueueEventKind;
use super::ticket::{FieldUpdate, Ticket, TicketChange, TicketStatus};

/// Reason recorded when a holder leaves without one already set.
pub const LEAVE_REASON: &str = "user_left";

const ACTIVE: &[TicketStatus] = &[TicketStatus::Active];
const CALLED: &[TicketStatus] = &[TicketStatus::Called];
const OUTSTANDING: &[TicketStatus] = &TicketStatus::OUTSTANDING;

/// An operator or holder action on an existing ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketAction {
    Call,
    Requeue,
    Cancel { reason: String },
    Complete,
    Leave,
}

impl TicketAction {
    /// Short name used in logs and error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Requeue => "requeue",
            Self::Cancel { .. } => "cancel",
            Self::Complete => "complete",
            Self::Leave => "leave",
        }
    }

    /// Statuses the action may start from.
    pub const fn allowed_from(&self) -> &'static [TicketStatus] {
        match self {
            Self::Call => ACTIVE,
            Self::Requeue | Self::Complete => CALLED,
            Self::Cancel { .. } | Self::Leave => OUTSTANDING,
        }
    }

    /// Event emitted after the transition commits.
    pub const fn event_kind(&self) -> QueueEventKind {
        match self {
            Self::Call => QueueEventKind::TicketCalled,
            Self::Requeue => QueueEventKind::TicketRequeued,
            Self::Cancel { .. } => QueueEventKind::TicketCanceled,
            Self::Complete => QueueEventKind::TicketCompleted,
            Self::Leave => QueueEventKind::TicketLeft,
        }
    }

    /// Validate the action against a ticket snapshot and build the write.
    pub fn plan(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<TransitionPlan, TransitionError> {
        let from = ticket.status();
        let expected = self.allowed_from();
        if !expected.contains(&from) {
            return Err(match self {
                Self::Leave if from.is_terminal() => TransitionError::AlreadyTerminal { from },
                _ => TransitionError::Invalid {
                    action: self.name(),
                    from,
                },
            });
        }

        let change = match self {
            Self::Call => TicketChange {
                called_at: FieldUpdate::Set(now),
                ..TicketChange::status_only(TicketStatus::Called)
            },
            Self::Requeue => TicketChange {
                called_at: FieldUpdate::Clear,
                ..TicketChange::status_only(TicketStatus::Active)
            },
            Self::Complete => TicketChange {
                completed_at: FieldUpdate::Set(now),
                ..TicketChange::status_only(TicketStatus::Used)
            },
            Self::Cancel { reason } => TicketChange {
                completed_at: FieldUpdate::Set(now),
                cancel_reason: FieldUpdate::Set(reason.clone()),
                ..TicketChange::status_only(TicketStatus::Canceled)
            },
            Self::Leave => TicketChange {
                completed_at: FieldUpdate::Set(now),
                cancel_reason: match ticket.cancel_reason() {
                    Some(_) => FieldUpdate::Keep,
                    None => FieldUpdate::Set(LEAVE_REASON.to_owned()),
                },
                ..TicketChange::status_only(TicketStatus::Canceled)
            },
        };

        Ok(TransitionPlan { expected, change })
    }
}

/// A validated write: the status set to compare against and the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub expected: &'static [TicketStatus],
    pub change: TicketChange,
}

/// Why a transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a ticket that is {from}")]
    Invalid {
        action: &'static str,
        from: TicketStatus,
    },
    #[error("ticket is already {from}")]
    AlreadyTerminal { from: TicketStatus },
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ids::{QueueId, TicketId, UserId};
    use crate::domain::ticket::TicketDraft;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).single().expect("valid time")
    }

    fn ticket_in(status: TicketStatus, now: DateTime<Utc>) -> Ticket {
        let created_at = now - TimeDelta::minutes(10);
        Ticket::new(TicketDraft {
            id: TicketId::random(),
            queue_id: QueueId::random(),
            user_id: UserId::random(),
            number: 3,
            status,
            cancel_reason: None,
            created_at,
            called_at: (status != TicketStatus::Active).then_some(created_at),
            completed_at: status.is_terminal().then_some(now),
        })
        .expect("valid ticket")
    }

    #[rstest]
    #[case(TicketAction::Call, TicketStatus::Active, TicketStatus::Called)]
    #[case(TicketAction::Requeue, TicketStatus::Called, TicketStatus::Active)]
    #[case(TicketAction::Complete, TicketStatus::Called, TicketStatus::Used)]
    #[case(TicketAction::Leave, TicketStatus::Active, TicketStatus::Canceled)]
    #[case(TicketAction::Leave, TicketStatus::Called, TicketStatus::Canceled)]
    #[case(TicketAction::Cancel { reason: "no_show".into() }, TicketStatus::Called, TicketStatus::Canceled)]
    fn allowed_transitions(
        now: DateTime<Utc>,
        #[case] action: TicketAction,
        #[case] from: TicketStatus,
        #[case] to: TicketStatus,
    ) {
        let ticket = ticket_in(from, now);
        let plan = action.plan(&ticket, now).expect("transition allowed");
        assert_eq!(plan.change.status, to);
        assert!(plan.expected.contains(&from));
        assert_eq!(ticket.apply(&plan.change).number(), ticket.number());
    }

    #[rstest]
    #[case(TicketAction::Call, TicketStatus::Called)]
    #[case(TicketAction::Requeue, TicketStatus::Active)]
    #[case(TicketAction::Complete, TicketStatus::Active)]
    #[case(TicketAction::Complete, TicketStatus::Used)]
    #[case(TicketAction::Cancel { reason: "x".into() }, TicketStatus::Used)]
    #[case(TicketAction::Cancel { reason: "x".into() }, TicketStatus::Canceled)]
    fn rejected_transitions(now: DateTime<Utc>, #[case] action: TicketAction, #[case] from: TicketStatus) {
        let ticket = ticket_in(from, now);
        let err = action.plan(&ticket, now).expect_err("transition rejected");
        assert_eq!(
            err,
            TransitionError::Invalid {
                action: action.name(),
                from
            }
        );
    }

    #[rstest]
    #[case(TicketStatus::Used)]
    #[case(TicketStatus::Canceled)]
    fn leaving_a_finished_ticket_is_already_terminal(now: DateTime<Utc>, #[case] from: TicketStatus) {
        let ticket = ticket_in(from, now);
        assert_eq!(
            TicketAction::Leave.plan(&ticket, now),
            Err(TransitionError::AlreadyTerminal { from })
        );
    }

    #[rstest]
    fn leave_records_default_reason(now: DateTime<Utc>) {
        let ticket = ticket_in(TicketStatus::Active, now);
        let plan = TicketAction::Leave.plan(&ticket, now).expect("leave allowed");
        let left = ticket.apply(&plan.change);
        assert_eq!(left.cancel_reason(), Some(LEAVE_REASON));
        assert_eq!(left.completed_at(), Some(now));
    }

    #[rstest]
    fn requeue_clears_called_at_and_keeps_number(now: DateTime<Utc>) {
        let ticket = ticket_in(TicketStatus::Called, now);
        let plan = TicketAction::Requeue.plan(&ticket, now).expect("requeue allowed");
        let requeued = ticket.apply(&plan.change);
        assert_eq!(requeued.called_at(), None);
        assert_eq!(requeued.number(), 3);
        assert_eq!(plan.expected, &[TicketStatus::Called]);
    }
}
