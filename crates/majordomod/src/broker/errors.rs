//! Broker error taxonomy. None of these stop the dispatch loop.

use majordomo_protocol::ProtocolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Conditions raised while handling a single broker event.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The message did not match any protocol shape and was dropped.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] ProtocolError),

    /// A worker-only command arrived from an identity that never sent READY.
    #[error("message from unknown worker {identity}")]
    UnknownWorker {
        /// Rendered worker identity.
        identity: String,
    },

    /// Sending to a peer failed; the peer is treated as gone.
    #[error("peer {identity} is unavailable: {source}")]
    PeerUnavailable {
        /// Rendered peer identity.
        identity: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
}
