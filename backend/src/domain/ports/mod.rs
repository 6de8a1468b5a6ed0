//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports (`TicketStore`, `EventPublisher`, `NotificationSink`) are
//! implemented by outbound adapters. Driving ports (`QueueCommand`,
//! `QueueQuery`) are implemented by the admission facade and called by
//! inbound adapters.

mod macros;
pub(crate) use macros::define_port_error;

mod event_publisher;
mod notification_sink;
mod queue_command;
mod queue_query;
mod ticket_store;

#[cfg(test)]
pub use event_publisher::MockEventPublisher;
pub use event_publisher::{EventPublisher, FixtureEventPublisher, PublishError};
#[cfg(test)]
pub use notification_sink::MockNotificationSink;
pub use notification_sink::{FixtureNotificationSink, NotificationError, NotificationSink};
pub use queue_command::QueueCommand;
pub use queue_query::{QueueQuery, QueueStatusView, TicketPositionView};
#[cfg(test)]
pub use ticket_store::MockTicketStore;
pub use ticket_store::{TicketAllocation, TicketStore, TicketStoreError};
