//! PostgreSQL persistence for places, queues and tickets.
//!
//! Row structs (`models.rs`) and table definitions (`schema.rs`) stay private;
//! [`DieselTicketStore`] converts them into validated domain types and maps
//! Diesel failures onto [`crate::domain::ports::TicketStoreError`].
//!
//! ```no_run
//! use smartqueue::outbound::persistence::{DbPool, DieselTicketStore, PoolConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/queues")).await?;
//! let store = DieselTicketStore::new(pool);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

mod diesel_error_mapping;
mod diesel_ticket_store;
mod models;
mod pool;
mod schema;

pub use diesel_ticket_store::DieselTicketStore;
pub use pool::{DbPool, PoolConfig, PoolError};
