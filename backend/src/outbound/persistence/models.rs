//! Internal Diesel row structs.
//!
//! These never leave the persistence layer; the store converts them to
//! validated domain types.

use chrono::{DateTime, NaiveTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{places, queues, tickets};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = places)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PlaceRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub max_concurrent_queues: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = queues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct QueueRow {
    pub id: Uuid,
    pub place_id: Uuid,
    pub name: String,
    pub is_open: bool,
    pub last_ticket_number: i32,
    pub processed_count: i32,
    pub total_tickets: i32,
    pub average_wait_ms: i64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Insertable struct for new queues. Counters start from column defaults.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = queues)]
pub(crate) struct NewQueueRow<'a> {
    pub id: Uuid,
    pub place_id: Uuid,
    pub name: &'a str,
    pub is_open: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = queues)]
pub(crate) struct QueueStatisticsUpdate {
    pub processed_count: i32,
    pub total_tickets: i32,
    pub average_wait_ms: i64,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = queues)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct QueueOpenUpdate {
    pub is_open: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TicketRow {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub user_id: Uuid,
    pub number: i32,
    pub status: String,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status transition. Outer `None` leaves a column untouched, `Some(None)`
/// writes null.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tickets)]
pub(crate) struct TicketStatusUpdate {
    pub status: &'static str,
    pub called_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub cancel_reason: Option<Option<String>>,
}
