//! Process lifecycle: bind the endpoints, run the components, stop on signal.

use std::time::Duration;

mod errors;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::{DaemonRuntime, run_daemon, run_daemon_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
