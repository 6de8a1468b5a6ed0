//! Domain primitives, rules and services.
//!
//! Purpose: model places, queues and tickets, the ticket lifecycle, the
//! statistics derived from it, and the events every committed change emits.
//! Types are transport agnostic; persistence and delivery live behind
//! [`ports`].
//!
//! Public surface:
//! - Entities: [`Place`], [`Queue`], [`Ticket`] and their identifiers.
//! - Rules: [`TicketAction`] (lifecycle), [`authorize`] (capability table),
//!   [`compute_statistics`] and [`compute_place_analytics`].
//! - Services: [`QueueEngine`], [`StatisticsAggregator`], [`EventFanout`] and
//!   the [`AdmissionService`] facade implementing the driving ports.
//! - Errors: [`Error`] with a stable [`ErrorCode`].

pub mod access;
pub mod admission_service;
pub mod analytics;
pub mod error;
pub mod events;
pub mod fanout;
pub mod ids;
pub mod notifications;
pub mod place;
pub mod ports;
pub mod queue;
pub mod queue_engine;
pub mod retry;
pub mod state_machine;
pub mod statistics;
mod store_access;
pub mod ticket;

pub use self::access::{
    AccessDenied, Caller, Capability, Grant, ParseRoleError, Resource, Role, authorize, grant,
};
pub use self::admission_service::{AdmissionService, AdmissionSettings};
pub use self::analytics::{AnalyticsSummary, HourlyBucket, PlaceAnalytics, compute_place_analytics};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::events::{QueueEvent, QueueEventKind, QueueSnapshot, TicketSnapshot, Topic};
pub use self::fanout::EventFanout;
pub use self::ids::{IdValidationError, PlaceId, QueueId, TicketId, UserId};
pub use self::notifications::{Notification, NotificationChannel};
pub use self::place::{Place, PlaceDraft, PlaceValidationError};
pub use self::queue::{Queue, QueueDraft, QueueStatistics, QueueTarget};
pub use self::queue_engine::{QueueEngine, TicketContext};
pub use self::retry::{
    AttemptJitter, AttemptOutcome, BackoffJitter, Retrier, RetryPolicy, RetrySleeper, TokioSleeper,
};
pub use self::state_machine::{LEAVE_REASON, TicketAction, TransitionError, TransitionPlan};
pub use self::statistics::{StatisticsAggregator, compute_statistics};
pub use self::ticket::{
    FieldUpdate, ParseTicketStatusError, Ticket, TicketChange, TicketDraft, TicketStatus,
    TicketValidationError,
};

/// Result alias for facade operations.
///
/// # Examples
/// ```
/// use smartqueue::domain::{EngineResult, Error};
///
/// fn lookup() -> EngineResult<u32> {
///     Err(Error::not_found("queue missing"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type EngineResult<T> = Result<T, Error>;
