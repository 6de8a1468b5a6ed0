//! Driving port for queue mutations.
//!
//! Inbound adapters (HTTP handlers, socket sessions, admin tooling) resolve
//! the caller's identity and role, then drive the engine through this port.
//! Every operation is authorised against the capability table before any
//! state changes.

use async_trait::async_trait;

use crate::domain::{
    Caller, Error, Place, PlaceDraft, PlaceId, Queue, QueueId, QueueTarget, Ticket, TicketId,
};

/// Domain use-case port for queue mutations.
#[async_trait]
pub trait QueueCommand: Send + Sync {
    /// Register a place. Place admins always become the owner.
    async fn register_place(&self, caller: &Caller, draft: PlaceDraft) -> Result<Place, Error>;

    /// Open a new queue at a place.
    async fn create_queue(&self, caller: &Caller, place_id: &PlaceId, name: &str) -> Result<Queue, Error>;

    /// Take the next ticket in the target queue.
    async fn join(&self, caller: &Caller, target: QueueTarget) -> Result<Ticket, Error>;

    /// Cancel one's own ticket.
    async fn leave(&self, caller: &Caller, ticket_id: &TicketId) -> Result<Ticket, Error>;

    /// Call a specific active ticket.
    async fn call(&self, caller: &Caller, ticket_id: &TicketId) -> Result<Ticket, Error>;

    /// Call the lowest-numbered active ticket.
    async fn call_next(&self, caller: &Caller, queue_id: &QueueId) -> Result<Ticket, Error>;

    /// Return a called ticket to active, keeping its number.
    async fn requeue(&self, caller: &Caller, ticket_id: &TicketId) -> Result<Ticket, Error>;

    /// Cancel an outstanding ticket on the holder's behalf.
    async fn cancel(&self, caller: &Caller, ticket_id: &TicketId, reason: &str) -> Result<Ticket, Error>;

    /// Mark a called ticket as served.
    async fn complete(&self, caller: &Caller, ticket_id: &TicketId) -> Result<Ticket, Error>;

    /// Flip a queue between open and closed.
    async fn toggle_open(&self, caller: &Caller, queue_id: &QueueId) -> Result<Queue, Error>;
}
