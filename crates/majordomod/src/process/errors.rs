//! Defines the unified error surface for daemon launch and supervision.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::durable::StoreError;
use crate::health::EndpointRole;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed before any endpoint was bound.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// One of the three endpoints could not be bound.
    #[error("failed to bind {role} endpoint: {source}")]
    Bind {
        /// Endpoint that failed.
        role: EndpointRole,
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The durable store could not be opened.
    #[error("failed to open durable store: {source}")]
    Store {
        /// Underlying store error.
        #[from]
        source: StoreError,
    },
    /// Installing the shutdown signal listener failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
