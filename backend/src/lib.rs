//! Ticket-queue orchestration engine.
//!
//! Walk-in customers take a numbered place in a physical queue and operators
//! advance it. The crate is split along hexagonal lines:
//!
//! - [`domain`] holds entities, the ticket state machine, statistics, event
//!   fan-out, the capability table and the admission facade, plus the ports
//!   the domain drives (`domain::ports`).
//! - [`outbound`] implements those ports: in-memory and PostgreSQL ticket
//!   stores, a broadcast pub/sub hub and a tracing notification sink.
//! - [`config`] and [`bootstrap`] wire settings into a ready engine.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod outbound;
pub mod telemetry;

pub use bootstrap::{BootstrapError, EngineHandle, build_engine};
pub use config::EngineSettings;
