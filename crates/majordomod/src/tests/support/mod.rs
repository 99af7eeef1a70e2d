//! Shared harness for the daemon behaviour suites.

mod config_loader;
mod reporter;
mod runtime;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use runtime::{PEER_TIMEOUT, RuntimeWorld};
