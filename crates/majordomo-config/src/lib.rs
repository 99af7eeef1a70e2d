//! Shared configuration for the Majordomo daemon and CLI.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file named by `--config-path` (or `MAJORDOMO_CONFIG_PATH`),
//! then `MAJORDOMO_*` environment variables, then command-line flags such as
//! `--client-endpoint tcp://127.0.0.1:5555`.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod defaults;
mod logging;
mod socket;
mod store;

pub use defaults::{
    DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_CLIENT_PORT, DEFAULT_EVENT_QUEUE_CAPACITY,
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_LIVENESS, DEFAULT_HOST, DEFAULT_LOG_FILTER,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_SEND_TIMEOUT_MS, DEFAULT_TITANIC_PORT, DEFAULT_WORKER_PORT,
    default_client_endpoint, default_log_filter, default_log_format, default_store_backend,
    default_store_dir, default_titanic_brokers, default_titanic_endpoint,
    default_worker_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{EndpointList, SocketEndpoint, SocketParseError, SocketPreparationError};
pub use store::StoreBackend;

/// Flags accepted by the configuration loader on the command line.
///
/// The CLI uses this list to separate configuration flags from subcommands.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--client-endpoint",
    "--worker-endpoint",
    "--titanic-endpoint",
    "--titanic-brokers",
    "--store-backend",
    "--store-dir",
    "--heartbeat-interval-ms",
    "--heartbeat-liveness",
    "--retry-interval-ms",
    "--attempt-timeout-ms",
    "--send-timeout-ms",
    "--event-queue-capacity",
    "--log-filter",
    "--log-format",
];

/// Resolved configuration shared by every Majordomo binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MAJORDOMO")]
#[serde(default)]
pub struct Config {
    /// Endpoint the broker binds for clients.
    #[ortho_config(default = default_client_endpoint())]
    pub client_endpoint: SocketEndpoint,
    /// Endpoint the broker binds for workers.
    #[ortho_config(default = default_worker_endpoint())]
    pub worker_endpoint: SocketEndpoint,
    /// Endpoint the durable gateway binds for clients.
    #[ortho_config(default = default_titanic_endpoint())]
    pub titanic_endpoint: SocketEndpoint,
    /// Brokers the durable dispatcher tries, in order.
    #[ortho_config(default = default_titanic_brokers())]
    pub titanic_brokers: EndpointList,
    /// Persistence backend for durable records.
    #[ortho_config(default = default_store_backend())]
    pub store_backend: StoreBackend,
    /// Directory used by the file store backend.
    #[ortho_config(default = default_store_dir())]
    pub store_dir: Utf8PathBuf,
    /// Interval between heartbeats and liveness sweeps.
    #[ortho_config(default = DEFAULT_HEARTBEAT_INTERVAL_MS)]
    pub heartbeat_interval_ms: u64,
    /// Missed heartbeat intervals tolerated before eviction.
    #[ortho_config(default = DEFAULT_HEARTBEAT_LIVENESS)]
    pub heartbeat_liveness: u32,
    /// Interval between durable dispatch cycles.
    #[ortho_config(default = DEFAULT_RETRY_INTERVAL_MS)]
    pub retry_interval_ms: u64,
    /// Per-attempt reply timeout for durable delivery.
    #[ortho_config(default = DEFAULT_ATTEMPT_TIMEOUT_MS)]
    pub attempt_timeout_ms: u64,
    /// Write timeout for every outbound send.
    #[ortho_config(default = DEFAULT_SEND_TIMEOUT_MS)]
    pub send_timeout_ms: u64,
    /// Capacity of the broker's bounded event queue.
    #[ortho_config(default = DEFAULT_EVENT_QUEUE_CAPACITY)]
    pub event_queue_capacity: usize,
    /// `tracing-subscriber` filter directive.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_endpoint: default_client_endpoint(),
            worker_endpoint: default_worker_endpoint(),
            titanic_endpoint: default_titanic_endpoint(),
            titanic_brokers: default_titanic_brokers(),
            store_backend: default_store_backend(),
            store_dir: default_store_dir(),
            heartbeat_interval_ms: defaults::default_heartbeat_interval_ms(),
            heartbeat_liveness: defaults::default_heartbeat_liveness(),
            retry_interval_ms: defaults::default_retry_interval_ms(),
            attempt_timeout_ms: defaults::default_attempt_timeout_ms(),
            send_timeout_ms: defaults::default_send_timeout_ms(),
            event_queue_capacity: defaults::default_event_queue_capacity(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint the broker binds for clients.
    #[must_use]
    pub fn client_endpoint(&self) -> &SocketEndpoint {
        &self.client_endpoint
    }

    /// Endpoint the broker binds for workers.
    #[must_use]
    pub fn worker_endpoint(&self) -> &SocketEndpoint {
        &self.worker_endpoint
    }

    /// Endpoint the durable gateway binds for clients.
    #[must_use]
    pub fn titanic_endpoint(&self) -> &SocketEndpoint {
        &self.titanic_endpoint
    }

    /// Brokers the durable dispatcher tries, in order.
    #[must_use]
    pub fn titanic_brokers(&self) -> &[SocketEndpoint] {
        self.titanic_brokers.as_slice()
    }

    /// Persistence backend for durable records.
    #[must_use]
    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    /// Directory used by the file store backend.
    #[must_use]
    pub fn store_dir(&self) -> &Utf8Path {
        &self.store_dir
    }

    /// Interval between heartbeats and liveness sweeps.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Age after which a silent worker is evicted.
    #[must_use]
    pub fn heartbeat_expiry(&self) -> Duration {
        self.heartbeat_interval()
            .saturating_mul(self.heartbeat_liveness)
    }

    /// Interval between durable dispatch cycles.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Per-attempt reply timeout for durable delivery.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Write timeout for every outbound send.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Capacity of the broker's bounded event queue.
    #[must_use]
    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }

    /// `tracing-subscriber` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Rejects values that would stall or disable the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let positive = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_liveness", u64::from(self.heartbeat_liveness)),
            ("retry_interval_ms", self.retry_interval_ms),
            ("attempt_timeout_ms", self.attempt_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigValidationError::Zero { field });
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigValidationError::Zero {
                field: "event_queue_capacity",
            });
        }
        Ok(())
    }
}

/// Errors raised by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// A duration, count, or capacity was zero.
    #[error("configuration field '{field}' must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
}
