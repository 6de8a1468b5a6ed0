//! Diesel table definitions for the queue schema.
//!
//! These must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Venues that run queues.
    places (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Varchar,
        address -> Text,
        latitude -> Float8,
        longitude -> Float8,
        opening_time -> Nullable<Time>,
        closing_time -> Nullable<Time>,
        /// Upper bound on simultaneously open queues.
        max_concurrent_queues -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Numbered lines at a place, with derived statistics.
    queues (id) {
        id -> Uuid,
        place_id -> Uuid,
        name -> Varchar,
        is_open -> Bool,
        /// Highest ticket number issued so far.
        last_ticket_number -> Int4,
        processed_count -> Int4,
        total_tickets -> Int4,
        /// Mean wait of used tickets, in milliseconds.
        average_wait_ms -> Int8,
        created_at -> Timestamptz,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Tickets issued by queues. `(queue_id, number)` is unique.
    tickets (id) {
        id -> Uuid,
        queue_id -> Uuid,
        user_id -> Uuid,
        number -> Int4,
        /// One of `active`, `called`, `used`, `canceled`.
        status -> Varchar,
        cancel_reason -> Nullable<Text>,
        created_at -> Timestamptz,
        called_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(queues -> places (place_id));
diesel::joinable!(tickets -> queues (queue_id));

diesel::allow_tables_to_appear_in_same_query!(places, queues, tickets);
