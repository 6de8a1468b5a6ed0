//! Diesel and pool error mapping for the ticket store.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::TicketStoreError;

use super::pool::PoolError;

/// Pool checkout and build failures are connectivity problems.
pub(crate) fn map_pool_error(error: PoolError) -> TicketStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            TicketStoreError::connection(message)
        }
    }
}

/// Classify a Diesel error.
///
/// Serialization failures and unique violations (a concurrent writer took
/// the same number or slot) are retryable conflicts.
pub(crate) fn map_diesel_error(error: DieselError) -> TicketStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        other => debug!(error = %other, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::UniqueViolation,
            info,
        ) => TicketStoreError::serialization_conflict(info.message()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            TicketStoreError::connection("database connection closed")
        }
        DieselError::DatabaseError(_, info) => TicketStoreError::query(info.message()),
        DieselError::NotFound => TicketStoreError::query("record not found"),
        DieselError::BrokenTransactionManager => {
            TicketStoreError::connection("transaction manager broken")
        }
        other => TicketStoreError::query(other.to_string()),
    }
}
