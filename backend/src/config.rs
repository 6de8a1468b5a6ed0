//! Engine configuration loaded via OrthoConfig.
//!
//! Values layer defaults, configuration files, `SMARTQUEUE_*` environment
//! variables and command-line flags, in increasing precedence.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{AdmissionSettings, RetryPolicy};
use crate::outbound::persistence::PoolConfig;

/// Settings controlling store selection, retries and fan-out.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SMARTQUEUE")]
pub struct EngineSettings {
    /// PostgreSQL URL. Without one the engine keeps state in memory.
    pub database_url: Option<String>,
    #[ortho_config(default = 10)]
    pub pool_max_size: u32,
    #[ortho_config(default = 30_000)]
    pub pool_connection_timeout_ms: u64,
    /// Attempts per read-validate-write cycle, including the first.
    #[ortho_config(default = 3)]
    pub retry_max_attempts: u32,
    #[ortho_config(default = 25)]
    pub retry_initial_backoff_ms: u64,
    #[ortho_config(default = 500)]
    pub retry_max_backoff_ms: u64,
    /// Bound on each individual store call.
    #[ortho_config(default = 5_000)]
    pub store_timeout_ms: u64,
    /// Events buffered per topic before slow subscribers lag.
    #[ortho_config(default = 256)]
    pub fanout_capacity: usize,
}

impl EngineSettings {
    /// Retry policy with at least one attempt and `max_backoff >= initial_backoff`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(
                self.retry_max_backoff_ms.max(self.retry_initial_backoff_ms),
            ),
        }
    }

    /// Facade tunables derived from these settings.
    pub fn admission_settings(&self) -> AdmissionSettings {
        AdmissionSettings {
            retry: self.retry_policy(),
            store_timeout: Duration::from_millis(self.store_timeout_ms.max(1)),
        }
    }

    /// Pool settings, when a database is configured.
    pub fn pool_config(&self) -> Option<PoolConfig> {
        self.database_url.as_deref().map(|url| {
            PoolConfig::new(url)
                .with_max_size(self.pool_max_size)
                .with_connection_timeout(Duration::from_millis(self.pool_connection_timeout_ms))
        })
    }
}
