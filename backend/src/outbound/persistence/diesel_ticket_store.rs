//! PostgreSQL-backed `TicketStore` using Diesel.
//!
//! Numbering locks the queue row (`SELECT ... FOR UPDATE`) so concurrent
//! joins on one queue serialise while other queues proceed. Toggling and
//! statistics refreshes take the same row lock, so they act on the latest
//! committed state. Opening a queue also locks the place row before counting
//! its open queues. Status changes are a single conditional
//! `UPDATE ... WHERE status IN (...)`.
//!
//! The partial unique index on `(queue_id, user_id)` for outstanding tickets
//! and the unique `(queue_id, number)` index back these checks; a violation
//! surfaces as a retryable conflict.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{TicketAllocation, TicketStore, TicketStoreError};
use crate::domain::{
    Place, PlaceDraft, PlaceId, Queue, QueueDraft, QueueId, QueueStatistics, Ticket, TicketChange,
    TicketDraft, TicketId, TicketStatus, UserId, compute_statistics,
};

use super::diesel_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    NewQueueRow, PlaceRow, QueueOpenUpdate, QueueRow, QueueStatisticsUpdate, TicketRow,
    TicketStatusUpdate,
};
use super::pool::DbPool;
use super::schema::{places, queues, tickets};

/// Diesel-backed implementation of the ticket store port.
#[derive(Clone)]
pub struct DieselTicketStore {
    pool: DbPool,
}

impl DieselTicketStore {
    /// Build a store drawing connections from `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Failure inside a transaction: either Diesel or a domain rule.
enum TxError {
    Diesel(DieselError),
    Store(TicketStoreError),
}

impl From<DieselError> for TxError {
    fn from(error: DieselError) -> Self {
        Self::Diesel(error)
    }
}

impl From<TicketStoreError> for TxError {
    fn from(error: TicketStoreError) -> Self {
        Self::Store(error)
    }
}

impl TxError {
    fn into_store(self) -> TicketStoreError {
        match self {
            Self::Diesel(error) => map_diesel_error(error),
            Self::Store(error) => error,
        }
    }
}

fn to_db_int(value: u32, field: &str) -> Result<i32, TicketStoreError> {
    i32::try_from(value).map_err(|_| TicketStoreError::query(format!("{field} {value} exceeds column range")))
}

fn from_db_int(value: i32, field: &str) -> Result<u32, TicketStoreError> {
    u32::try_from(value).map_err(|_| TicketStoreError::query(format!("{field} is negative: {value}")))
}

fn status_names(statuses: &[TicketStatus]) -> Vec<&'static str> {
    statuses.iter().map(|status| status.as_str()).collect()
}

fn parse_status(raw: &str) -> Result<TicketStatus, TicketStoreError> {
    raw.parse::<TicketStatus>()
        .map_err(|err| TicketStoreError::query(err.to_string()))
}

fn place_to_row(place: &Place) -> Result<PlaceRow, TicketStoreError> {
    Ok(PlaceRow {
        id: *place.id().as_uuid(),
        owner_id: *place.owner_id().as_uuid(),
        name: place.name().to_owned(),
        address: place.address().to_owned(),
        latitude: place.latitude(),
        longitude: place.longitude(),
        opening_time: place.opening_time(),
        closing_time: place.closing_time(),
        max_concurrent_queues: to_db_int(place.max_concurrent_queues(), "max_concurrent_queues")?,
        created_at: place.created_at(),
    })
}

fn row_to_place(row: PlaceRow) -> Result<Place, TicketStoreError> {
    Place::new(PlaceDraft {
        id: PlaceId::from_uuid(row.id),
        owner_id: UserId::from_uuid(row.owner_id),
        name: row.name,
        address: row.address,
        latitude: row.latitude,
        longitude: row.longitude,
        opening_time: row.opening_time,
        closing_time: row.closing_time,
        max_concurrent_queues: from_db_int(row.max_concurrent_queues, "max_concurrent_queues")?,
        created_at: row.created_at,
    })
    .map_err(|err| TicketStoreError::query(err.to_string()))
}

fn row_to_queue(row: QueueRow) -> Result<Queue, TicketStoreError> {
    let average_wait_time = TimeDelta::try_milliseconds(row.average_wait_ms).ok_or_else(|| {
        TicketStoreError::query(format!("average wait {}ms out of range", row.average_wait_ms))
    })?;
    Ok(Queue::from_draft(QueueDraft {
        id: QueueId::from_uuid(row.id),
        place_id: PlaceId::from_uuid(row.place_id),
        name: row.name,
        is_open: row.is_open,
        last_ticket_number: from_db_int(row.last_ticket_number, "last_ticket_number")?,
        statistics: QueueStatistics {
            processed_count: from_db_int(row.processed_count, "processed_count")?,
            total_tickets: from_db_int(row.total_tickets, "total_tickets")?,
            average_wait_time,
        },
        created_at: row.created_at,
        closed_at: row.closed_at,
    }))
}

fn statistics_update(statistics: &QueueStatistics) -> Result<QueueStatisticsUpdate, TicketStoreError> {
    Ok(QueueStatisticsUpdate {
        processed_count: to_db_int(statistics.processed_count, "processed_count")?,
        total_tickets: to_db_int(statistics.total_tickets, "total_tickets")?,
        average_wait_ms: statistics.average_wait_time.num_milliseconds(),
    })
}

fn ticket_to_row(ticket: &Ticket) -> Result<TicketRow, TicketStoreError> {
    Ok(TicketRow {
        id: *ticket.id().as_uuid(),
        queue_id: *ticket.queue_id().as_uuid(),
        user_id: *ticket.user_id().as_uuid(),
        number: to_db_int(ticket.number(), "number")?,
        status: ticket.status().as_str().to_owned(),
        cancel_reason: ticket.cancel_reason().map(str::to_owned),
        created_at: ticket.created_at(),
        called_at: ticket.called_at(),
        completed_at: ticket.completed_at(),
    })
}

fn row_to_ticket(row: TicketRow) -> Result<Ticket, TicketStoreError> {
    Ticket::new(TicketDraft {
        id: TicketId::from_uuid(row.id),
        queue_id: QueueId::from_uuid(row.queue_id),
        user_id: UserId::from_uuid(row.user_id),
        number: from_db_int(row.number, "number")?,
        status: parse_status(&row.status)?,
        cancel_reason: row.cancel_reason,
        created_at: row.created_at,
        called_at: row.called_at,
        completed_at: row.completed_at,
    })
    .map_err(|err| TicketStoreError::query(err.to_string()))
}

fn rows_to_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, TicketStoreError> {
    rows.into_iter().map(row_to_ticket).collect()
}

async fn lock_place(conn: &mut AsyncPgConnection, place_id: &PlaceId) -> Result<(), TxError> {
    places::table
        .find(*place_id.as_uuid())
        .select(places::id)
        .for_update()
        .first::<Uuid>(conn)
        .await
        .optional()?
        .map(|_| ())
        .ok_or_else(|| TicketStoreError::place_not_found(*place_id).into())
}

async fn lock_queue(conn: &mut AsyncPgConnection, queue_id: &QueueId) -> Result<Queue, TxError> {
    let row = queues::table
        .find(*queue_id.as_uuid())
        .select(QueueRow::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| TicketStoreError::queue_not_found(*queue_id))?;
    Ok(row_to_queue(row)?)
}

/// Fail when the place's other open queues already reach `limit`.
async fn ensure_open_slot(
    conn: &mut AsyncPgConnection,
    place_id: &PlaceId,
    exclude: &QueueId,
    limit: u32,
) -> Result<(), TxError> {
    let open: i64 = queues::table
        .filter(queues::place_id.eq(*place_id.as_uuid()))
        .filter(queues::is_open.eq(true))
        .filter(queues::id.ne(*exclude.as_uuid()))
        .count()
        .get_result(conn)
        .await?;
    if open >= i64::from(limit) {
        return Err(TicketStoreError::queue_limit_reached(*place_id, limit).into());
    }
    Ok(())
}

#[async_trait]
impl TicketStore for DieselTicketStore {
    async fn insert_place(&self, place: &Place) -> Result<(), TicketStoreError> {
        let row = place_to_row(place)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(places::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_place(&self, place_id: &PlaceId) -> Result<Option<Place>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        places::table
            .find(*place_id.as_uuid())
            .select(PlaceRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_place)
            .transpose()
    }

    async fn insert_queue(&self, queue: &Queue, max_open_queues: u32) -> Result<(), TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                lock_place(conn, queue.place_id()).await?;
                if queue.is_open() {
                    ensure_open_slot(conn, queue.place_id(), queue.id(), max_open_queues).await?;
                }
                let row = NewQueueRow {
                    id: *queue.id().as_uuid(),
                    place_id: *queue.place_id().as_uuid(),
                    name: queue.name(),
                    is_open: queue.is_open(),
                    created_at: queue.created_at(),
                    closed_at: queue.closed_at(),
                };
                diesel::insert_into(queues::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(TxError::into_store)
    }

    async fn find_queue(&self, queue_id: &QueueId) -> Result<Option<Queue>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        queues::table
            .find(*queue_id.as_uuid())
            .select(QueueRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_queue)
            .transpose()
    }

    async fn latest_queue_for_place(
        &self,
        place_id: &PlaceId,
        open_only: bool,
    ) -> Result<Option<Queue>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = queues::table
            .filter(queues::place_id.eq(*place_id.as_uuid()))
            .into_boxed();
        if open_only {
            query = query.filter(queues::is_open.eq(true));
        }
        query
            .order((queues::created_at.desc(), queues::id.desc()))
            .select(QueueRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_queue)
            .transpose()
    }

    async fn list_queues_for_place(&self, place_id: &PlaceId) -> Result<Vec<Queue>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<QueueRow> = queues::table
            .filter(queues::place_id.eq(*place_id.as_uuid()))
            .order((queues::created_at.asc(), queues::id.asc()))
            .select(QueueRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_queue).collect()
    }

    async fn toggle_queue_open(
        &self,
        queue_id: &QueueId,
        max_open_queues: u32,
        now: DateTime<Utc>,
    ) -> Result<Queue, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                let current = lock_queue(conn, queue_id).await?;
                let opening = !current.is_open();
                if opening {
                    lock_place(conn, current.place_id()).await?;
                    ensure_open_slot(conn, current.place_id(), queue_id, max_open_queues).await?;
                }
                let target = current.with_open_flag(opening, now);
                let row = diesel::update(queues::table.find(*queue_id.as_uuid()))
                    .set(&QueueOpenUpdate {
                        is_open: target.is_open(),
                        closed_at: target.closed_at(),
                    })
                    .returning(QueueRow::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(row_to_queue(row)?)
            }
            .scope_boxed()
        })
        .await
        .map_err(TxError::into_store)
    }

    async fn refresh_queue_statistics(&self, queue_id: &QueueId) -> Result<Queue, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                lock_queue(conn, queue_id).await?;
                let rows: Vec<TicketRow> = tickets::table
                    .filter(tickets::queue_id.eq(*queue_id.as_uuid()))
                    .order(tickets::number.asc())
                    .select(TicketRow::as_select())
                    .load(conn)
                    .await?;
                let statistics = compute_statistics(&rows_to_tickets(rows)?);
                let row = diesel::update(queues::table.find(*queue_id.as_uuid()))
                    .set(&statistics_update(&statistics)?)
                    .returning(QueueRow::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(row_to_queue(row)?)
            }
            .scope_boxed()
        })
        .await
        .map_err(TxError::into_store)
    }

    async fn allocate_ticket(&self, request: &TicketAllocation) -> Result<Ticket, TicketStoreError> {
        let outstanding = status_names(&TicketStatus::OUTSTANDING);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                let queue = lock_queue(conn, &request.queue_id).await?;
                if !queue.is_open() {
                    return Err(TicketStoreError::queue_closed(request.queue_id).into());
                }

                let held: i64 = tickets::table
                    .filter(tickets::queue_id.eq(*request.queue_id.as_uuid()))
                    .filter(tickets::user_id.eq(*request.user_id.as_uuid()))
                    .filter(tickets::status.eq_any(outstanding))
                    .count()
                    .get_result(conn)
                    .await?;
                if held > 0 {
                    return Err(
                        TicketStoreError::duplicate_active_ticket(request.queue_id, request.user_id)
                            .into(),
                    );
                }

                let highest: Option<i32> = tickets::table
                    .filter(tickets::queue_id.eq(*request.queue_id.as_uuid()))
                    .select(diesel::dsl::max(tickets::number))
                    .first(conn)
                    .await?;
                let highest = from_db_int(highest.unwrap_or(0), "number")?;
                let number = queue
                    .last_ticket_number()
                    .max(highest)
                    .checked_add(1)
                    .ok_or_else(|| TicketStoreError::query("ticket numbers exhausted"))?;

                let ticket = Ticket::issue(
                    request.ticket_id,
                    request.queue_id,
                    request.user_id,
                    number,
                    request.created_at,
                )
                .map_err(|err| TicketStoreError::query(err.to_string()))?;
                let row = ticket_to_row(&ticket)?;

                diesel::insert_into(tickets::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                diesel::update(queues::table.find(*request.queue_id.as_uuid()))
                    .set(queues::last_ticket_number.eq(row.number))
                    .execute(conn)
                    .await?;
                Ok(ticket)
            }
            .scope_boxed()
        })
        .await
        .map_err(TxError::into_store)
    }

    async fn compare_and_set_status(
        &self,
        ticket_id: &TicketId,
        expected: &[TicketStatus],
        change: &TicketChange,
    ) -> Result<Ticket, TicketStoreError> {
        let id = *ticket_id.as_uuid();
        let update = TicketStatusUpdate {
            status: change.status.as_str(),
            called_at: change.called_at.as_assignment(),
            completed_at: change.completed_at.as_assignment(),
            cancel_reason: change.cancel_reason.as_assignment(),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated: Option<TicketRow> = diesel::update(
            tickets::table
                .filter(tickets::id.eq(id))
                .filter(tickets::status.eq_any(status_names(expected))),
        )
        .set(&update)
        .returning(TicketRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        if let Some(row) = updated {
            return row_to_ticket(row);
        }

        let actual: Option<String> = tickets::table
            .find(id)
            .select(tickets::status)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        match actual {
            Some(status) => Err(TicketStoreError::stale_state(*ticket_id, parse_status(&status)?)),
            None => Err(TicketStoreError::ticket_not_found(*ticket_id)),
        }
    }

    async fn find_ticket(&self, ticket_id: &TicketId) -> Result<Option<Ticket>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        tickets::table
            .find(*ticket_id.as_uuid())
            .select(TicketRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_ticket)
            .transpose()
    }

    async fn list_outstanding_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<TicketRow> = tickets::table
            .filter(tickets::queue_id.eq(*queue_id.as_uuid()))
            .filter(tickets::status.eq_any(status_names(&TicketStatus::OUTSTANDING)))
            .order(tickets::number.asc())
            .select(TicketRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_tickets(rows)
    }

    async fn list_queue_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<TicketRow> = tickets::table
            .filter(tickets::queue_id.eq(*queue_id.as_uuid()))
            .order(tickets::number.asc())
            .select(TicketRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_tickets(rows)
    }
}

#[cfg(test)]
mod tests {
    //! Row conversion coverage; query behaviour needs a live database.
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().expect("valid time")
    }

    #[fixture]
    fn ticket_row(created_at: DateTime<Utc>) -> TicketRow {
        TicketRow {
            id: Uuid::new_v4(),
            queue_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            number: 7,
            status: "used".to_owned(),
            cancel_reason: None,
            created_at,
            called_at: Some(created_at + TimeDelta::minutes(3)),
            completed_at: Some(created_at + TimeDelta::minutes(5)),
        }
    }

    #[rstest]
    fn ticket_rows_round_trip(ticket_row: TicketRow) {
        let ticket = row_to_ticket(ticket_row.clone()).expect("valid row");
        assert_eq!(ticket.status(), TicketStatus::Used);
        assert_eq!(ticket.number(), 7);

        let back = ticket_to_row(&ticket).expect("fits columns");
        assert_eq!(back.status, ticket_row.status);
        assert_eq!(back.completed_at, ticket_row.completed_at);
    }

    #[rstest]
    fn unknown_status_is_a_query_error(mut ticket_row: TicketRow) {
        ticket_row.status = "lost".to_owned();
        let err = row_to_ticket(ticket_row).expect_err("bad status");
        assert_eq!(err.kind(), "query");
    }

    #[rstest]
    fn inconsistent_rows_are_rejected(mut ticket_row: TicketRow) {
        ticket_row.completed_at = None;
        assert!(row_to_ticket(ticket_row).is_err());
    }

    #[rstest]
    fn negative_counters_are_rejected(created_at: DateTime<Utc>) {
        let row = QueueRow {
            id: Uuid::new_v4(),
            place_id: Uuid::new_v4(),
            name: "Main".to_owned(),
            is_open: true,
            last_ticket_number: -1,
            processed_count: 0,
            total_tickets: 0,
            average_wait_ms: 0,
            created_at,
            closed_at: None,
        };
        assert_eq!(row_to_queue(row).expect_err("negative").kind(), "query");
    }

    #[rstest]
    fn queue_rows_restore_statistics(created_at: DateTime<Utc>) {
        let row = QueueRow {
            id: Uuid::new_v4(),
            place_id: Uuid::new_v4(),
            name: "Main".to_owned(),
            is_open: false,
            last_ticket_number: 12,
            processed_count: 9,
            total_tickets: 12,
            average_wait_ms: 90_000,
            created_at,
            closed_at: Some(created_at),
        };
        let queue = row_to_queue(row).expect("valid row");
        assert_eq!(queue.statistics().average_wait_time, TimeDelta::seconds(90));
        assert_eq!(queue.last_ticket_number(), 12);
        assert!(!queue.is_open());
    }

    #[rstest]
    fn oversized_numbers_do_not_fit_columns() {
        assert!(to_db_int(u32::MAX, "number").is_err());
        assert_eq!(to_db_int(41, "number").expect("fits"), 41);
    }

    #[rstest]
    fn statistics_convert_to_column_values() {
        let update = statistics_update(&QueueStatistics {
            processed_count: 4,
            total_tickets: 9,
            average_wait_time: TimeDelta::seconds(75),
        })
        .expect("fits columns");
        assert_eq!(update.processed_count, 4);
        assert_eq!(update.total_tickets, 9);
        assert_eq!(update.average_wait_ms, 75_000);

        let overflow = statistics_update(&QueueStatistics {
            total_tickets: u32::MAX,
            ..QueueStatistics::default()
        });
        assert!(overflow.is_err());
    }
}
