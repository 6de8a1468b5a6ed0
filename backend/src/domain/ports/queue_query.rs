//! Driving port for queue reads.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{
    Caller, Error, PlaceAnalytics, PlaceId, QueueId, QueueSnapshot, QueueTarget, TicketId,
    TicketSnapshot,
};

/// Current state of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatusView {
    pub queue: QueueSnapshot,
    /// Active tickets, lowest number first.
    pub waiting: Vec<TicketSnapshot>,
    /// Called tickets, lowest number first.
    pub serving: Vec<TicketSnapshot>,
    /// The ticket `call_next` would pick.
    pub next_to_serve: Option<TicketSnapshot>,
}

/// Where a ticket stands in its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketPositionView {
    pub ticket: TicketSnapshot,
    /// Active tickets with a lower number. `None` once the ticket is no
    /// longer waiting.
    pub ahead: Option<u32>,
}

/// Domain use-case port for queue reads.
#[async_trait]
pub trait QueueQuery: Send + Sync {
    /// Snapshot plus ordered outstanding tickets.
    async fn queue_status(&self, caller: &Caller, target: QueueTarget) -> Result<QueueStatusView, Error>;

    /// Stored statistics of a queue.
    async fn queue_statistics(&self, caller: &Caller, queue_id: &QueueId) -> Result<QueueSnapshot, Error>;

    /// Number of active tickets ahead of a ticket.
    async fn ticket_position(&self, caller: &Caller, ticket_id: &TicketId) -> Result<TicketPositionView, Error>;

    /// Summary and hourly timeline across a place's queues.
    async fn place_analytics(&self, caller: &Caller, place_id: &PlaceId) -> Result<PlaceAnalytics, Error>;
}
