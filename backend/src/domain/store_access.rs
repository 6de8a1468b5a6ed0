//! Timeout bounding and error mapping for ticket store calls.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use super::Error;
use super::ports::TicketStoreError;

/// Run a store call, turning an elapsed deadline into a connection error.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, TicketStoreError>
where
    F: Future<Output = Result<T, TicketStoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis(), "ticket store call timed out");
            Err(TicketStoreError::connection(format!(
                "{operation} timed out after {}ms",
                limit.as_millis()
            )))
        }
    }
}

/// Map a store error onto the domain error surfaced to callers.
pub(crate) fn map_store_error(error: TicketStoreError) -> Error {
    let message = error.to_string();
    match error {
        TicketStoreError::PlaceNotFound { .. }
        | TicketStoreError::QueueNotFound { .. }
        | TicketStoreError::TicketNotFound { .. } => Error::not_found(message),
        TicketStoreError::QueueClosed { queue_id } => {
            Error::queue_closed(message).with_details(json!({ "queue_id": queue_id }))
        }
        TicketStoreError::QueueLimitReached { place_id, limit } => Error::invalid_request(message)
            .with_details(json!({ "place_id": place_id, "max_concurrent_queues": limit })),
        TicketStoreError::DuplicateActiveTicket { queue_id, .. } => {
            Error::duplicate_active_ticket(message).with_details(json!({ "queue_id": queue_id }))
        }
        TicketStoreError::StaleState { .. } | TicketStoreError::SerializationConflict { .. } => {
            Error::conflict(message)
        }
        TicketStoreError::Connection { .. } => Error::service_unavailable(message),
        TicketStoreError::Query { .. } => Error::internal(message),
    }
}
