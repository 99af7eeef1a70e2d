use std::env;

use camino::Utf8PathBuf;
use dirs::data_local_dir;

use crate::logging::LogFormat;
use crate::socket::{EndpointList, SocketEndpoint};
use crate::store::StoreBackend;

/// Loopback address every default endpoint binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the broker accepts clients on.
pub const DEFAULT_CLIENT_PORT: u16 = 5555;

/// Port the broker accepts workers on.
pub const DEFAULT_WORKER_PORT: u16 = 5556;

/// Port the durable gateway accepts clients on.
pub const DEFAULT_TITANIC_PORT: u16 = 5557;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Interval between heartbeats and liveness sweeps, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2_500;

/// Number of missed heartbeat intervals before a worker is evicted.
pub const DEFAULT_HEARTBEAT_LIVENESS: u32 = 3;

/// Interval between durable dispatch cycles, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 2_000;

/// Time the durable dispatcher waits for one broker reply, in milliseconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 1_000;

/// Write timeout applied to every outbound send, in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 1_000;

/// Capacity of the broker's event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1_024;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Endpoint the broker binds for clients.
#[must_use]
pub fn default_client_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_CLIENT_PORT)
}

/// Endpoint the broker binds for workers.
#[must_use]
pub fn default_worker_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_WORKER_PORT)
}

/// Endpoint the durable gateway binds for clients.
#[must_use]
pub fn default_titanic_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_TITANIC_PORT)
}

/// Brokers the durable dispatcher delivers to: the local client endpoint.
#[must_use]
pub fn default_titanic_brokers() -> EndpointList {
    EndpointList::from(default_client_endpoint())
}

/// Default durable store backend.
#[must_use]
pub fn default_store_backend() -> StoreBackend {
    StoreBackend::File
}

/// Directory holding durable records for the file backend.
///
/// Uses the platform data directory when one is known and the temporary
/// directory otherwise.
#[must_use]
pub fn default_store_dir() -> Utf8PathBuf {
    let mut base = data_local_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .or_else(|| Utf8PathBuf::from_path_buf(env::temp_dir()).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp"));
    base.push("majordomo");
    base.push("titanic");
    base
}

pub(crate) const fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

pub(crate) const fn default_heartbeat_liveness() -> u32 {
    DEFAULT_HEARTBEAT_LIVENESS
}

pub(crate) const fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

pub(crate) const fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_MS
}

pub(crate) const fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

pub(crate) const fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}
