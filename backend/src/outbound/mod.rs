//! Outbound adapters implementing the domain's driven ports.
//!
//! - **memory_store**: sharded in-process [`TicketStore`](crate::domain::ports::TicketStore)
//! - **persistence**: PostgreSQL ticket store using Diesel
//! - **broadcast_hub**: topic fan-out over Tokio broadcast channels
//! - **notifications**: log-backed notification sink
//!
//! Adapters translate between domain types and infrastructure; queue rules
//! stay in the domain.

pub mod broadcast_hub;
pub mod memory_store;
pub mod notifications;
pub mod persistence;

pub use broadcast_hub::{BroadcastHub, EventPayload};
pub use memory_store::InMemoryTicketStore;
pub use notifications::TracingNotificationSink;
