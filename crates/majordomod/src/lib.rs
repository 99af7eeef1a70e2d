//! Majordomo broker daemon.
//!
//! The daemon binds three router endpoints. Clients send requests naming a
//! service to the client endpoint; workers register for a service on the
//! worker endpoint and receive those requests one at a time, round-robin by
//! idleness. A liveness sweep evicts workers whose heartbeats stop.
//!
//! The third endpoint fronts the durable layer. A SAVE persists a request and
//! returns its id at once; a background dispatcher delivers pending records
//! through the broker and stores the replies, which clients collect with
//! FETCH and acknowledge with CLOSE.
//!
//! The [`peers`] module carries the client and worker sides used by the
//! `majordomo` CLI and by tests.

mod bootstrap;
pub mod broker;
pub mod durable;
mod health;
pub mod peers;
mod process;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{EndpointRole, HealthReporter, StructuredHealthReporter};
pub use process::{
    DaemonRuntime, LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
    run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
