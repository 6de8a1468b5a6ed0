//! Port for durable place, queue and ticket state.
//!
//! Adapters own the atomicity guarantees the engine relies on:
//! - `allocate_ticket` assigns the next number, checks the queue is open and
//!   rejects a second outstanding ticket for the same user, all under one
//!   per-queue critical section.
//! - `compare_and_set_status` writes only when the stored status is in the
//!   expected set, reporting the actual status otherwise.
//! - Opening a queue (on create or toggle) is checked against the place's
//!   concurrent-queue limit inside the same critical section as the write.
//! - Statistics are read and written under the queue's critical section,
//!   so a slower refresh never overwrites a newer one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Place, PlaceId, Queue, QueueId, Ticket, TicketChange, TicketId, TicketStatus, UserId,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ticket store adapters.
    pub enum TicketStoreError {
        /// No place with the given id.
        PlaceNotFound { place_id: PlaceId } => "place {place_id} not found",
        /// No queue with the given id.
        QueueNotFound { queue_id: QueueId } => "queue {queue_id} not found",
        /// No ticket with the given id.
        TicketNotFound { ticket_id: TicketId } => "ticket {ticket_id} not found",
        /// The queue is not accepting joins.
        QueueClosed { queue_id: QueueId } => "queue {queue_id} is closed",
        /// The place already has as many open queues as it allows.
        QueueLimitReached { place_id: PlaceId, limit: u32 } =>
            "place {place_id} already has {limit} open queue(s)",
        /// The user already holds an outstanding ticket in the queue.
        DuplicateActiveTicket { queue_id: QueueId, user_id: UserId } =>
            "user {user_id} already holds an outstanding ticket in queue {queue_id}",
        /// The ticket's status moved since it was read.
        StaleState { ticket_id: TicketId, actual: TicketStatus } =>
            "ticket {ticket_id} is now {actual}",
        /// The backend aborted the transaction; safe to retry.
        SerializationConflict { message: String } =>
            "ticket store serialization conflict: {message}",
        /// Store connection could not be established.
        Connection { message: String } => "ticket store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "ticket store query failed: {message}",
    }
}

impl TicketStoreError {
    /// Whether retrying the whole read-validate-write cycle may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleState { .. } | Self::SerializationConflict { .. }
        )
    }
}

/// Request to issue a ticket; the store picks the number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAllocation {
    pub ticket_id: TicketId,
    pub queue_id: QueueId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Port for reading and mutating queue state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persist a new place.
    async fn insert_place(&self, place: &Place) -> Result<(), TicketStoreError>;

    /// Find a place by id.
    async fn find_place(&self, place_id: &PlaceId) -> Result<Option<Place>, TicketStoreError>;

    /// Persist a new open queue, failing with `QueueLimitReached` when the
    /// place already has `max_open_queues` open queues.
    async fn insert_queue(&self, queue: &Queue, max_open_queues: u32) -> Result<(), TicketStoreError>;

    /// Find a queue by id.
    async fn find_queue(&self, queue_id: &QueueId) -> Result<Option<Queue>, TicketStoreError>;

    /// Most recently created queue of a place, optionally only among open ones.
    async fn latest_queue_for_place(
        &self,
        place_id: &PlaceId,
        open_only: bool,
    ) -> Result<Option<Queue>, TicketStoreError>;

    /// Every queue of a place, oldest first.
    async fn list_queues_for_place(&self, place_id: &PlaceId) -> Result<Vec<Queue>, TicketStoreError>;

    /// Flip the open flag under the queue's critical section and return the
    /// new state. Opening is checked against `max_open_queues`.
    async fn toggle_queue_open(
        &self,
        queue_id: &QueueId,
        max_open_queues: u32,
        now: DateTime<Utc>,
    ) -> Result<Queue, TicketStoreError>;

    /// Recompute the queue's statistics from its tickets and store them,
    /// holding the queue's critical section for both steps.
    async fn refresh_queue_statistics(&self, queue_id: &QueueId) -> Result<Queue, TicketStoreError>;

    /// Atomically number and insert a new active ticket.
    async fn allocate_ticket(&self, request: &TicketAllocation) -> Result<Ticket, TicketStoreError>;

    /// Apply `change` only if the ticket's status is in `expected`.
    async fn compare_and_set_status(
        &self,
        ticket_id: &TicketId,
        expected: &[TicketStatus],
        change: &TicketChange,
    ) -> Result<Ticket, TicketStoreError>;

    /// Find a ticket by id.
    async fn find_ticket(&self, ticket_id: &TicketId) -> Result<Option<Ticket>, TicketStoreError>;

    /// Active and called tickets of a queue, ordered by number ascending.
    async fn list_outstanding_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError>;

    /// Every ticket a queue ever issued, ordered by number ascending.
    async fn list_queue_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError>;
}
