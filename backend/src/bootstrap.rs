//! Wire settings into a ready admission facade.

use std::sync::Arc;

use mockable::DefaultClock;
use tracing::info;

use crate::config::EngineSettings;
use crate::domain::AdmissionService;
use crate::domain::ports::TicketStore;
use crate::outbound::persistence::{DbPool, DieselTicketStore, PoolError};
use crate::outbound::{BroadcastHub, InMemoryTicketStore, TracingNotificationSink};

/// Errors raised while assembling the engine.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("database pool unavailable: {0}")]
    Pool(#[from] PoolError),
}

/// The assembled engine.
///
/// Inbound adapters drive `service` and subscribe socket sessions to `hub`.
#[derive(Clone)]
pub struct EngineHandle {
    pub service: AdmissionService,
    pub hub: Arc<BroadcastHub>,
}

/// Build the engine, using PostgreSQL when a database URL is configured.
///
/// # Examples
///
/// ```
/// use std::ffi::OsString;
/// use ortho_config::OrthoConfig;
/// use smartqueue::{EngineSettings, build_engine};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = EngineSettings::load_from_iter([OsString::from("smartqueue")])?;
/// let engine = build_engine(&settings).await?;
/// # let _ = engine;
/// # Ok(())
/// # }
/// ```
pub async fn build_engine(settings: &EngineSettings) -> Result<EngineHandle, BootstrapError> {
    let store: Arc<dyn TicketStore> = match settings.pool_config() {
        Some(config) => {
            let pool = DbPool::new(config).await?;
            info!("using PostgreSQL ticket store");
            Arc::new(DieselTicketStore::new(pool))
        }
        None => {
            info!("using in-memory ticket store");
            Arc::new(InMemoryTicketStore::new())
        }
    };

    let hub = Arc::new(BroadcastHub::new(settings.fanout_capacity));
    let service = AdmissionService::new(
        store,
        hub.clone(),
        Arc::new(TracingNotificationSink),
        Arc::new(DefaultClock),
        settings.admission_settings(),
    );
    Ok(EngineHandle { service, hub })
}
