//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use majordomod::TelemetryError;
use majordomod::peers::PeerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to install signal handlers: {0}")]
    InstallSignals(#[source] io::Error),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error("request {id} is not known to the gateway")]
    UnknownRequest { id: String },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}
