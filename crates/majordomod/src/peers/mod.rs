//! Peer-side programs: the broker client, the durable client and the worker
//! session loop.

mod client;
mod worker;

use std::time::{Duration, Instant};

use majordomo_protocol::{Frame, ProtocolError, RoutingEnvelope};
use thiserror::Error;

use crate::transport::{Connection, Inbound, TransportError};

pub use self::client::{CloseOutcome, FetchOutcome, MajordomoClient, TitanicClient};
pub use self::worker::{SessionEnd, WorkerSession, WorkerSettings};

pub(crate) const PEER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::peers");

/// Failures seen by clients and workers.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Connecting or sending failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The peer sent something that does not decode.
    #[error("malformed message: {0}")]
    Protocol(#[from] ProtocolError),
    /// No answer arrived in time.
    #[error("no reply within {timeout:?}")]
    Timeout {
        /// Time waited.
        timeout: Duration,
    },
    /// The connection closed underneath the peer.
    #[error("connection closed")]
    Closed,
    /// A well-formed message arrived that does not answer the request.
    #[error("unexpected reply: {detail}")]
    Unexpected {
        /// What arrived instead.
        detail: String,
    },
    /// The durable gateway answered `ERROR`.
    #[error("gateway error: {reason}")]
    Gateway {
        /// Reason reported by the gateway.
        reason: String,
    },
    /// The broker missed too many heartbeats.
    #[error("broker silent for {intervals} heartbeat intervals")]
    BrokerSilent {
        /// Intervals waited.
        intervals: u32,
    },
}

/// Sends one payload to the directly connected router and waits for the next
/// message.
fn round_trip(
    connection: &dyn Connection,
    frames: Vec<Frame>,
    timeout: Duration,
) -> Result<Vec<Frame>, PeerError> {
    connection.send(&RoutingEnvelope::default(), frames)?;
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match connection.receive_timeout(remaining) {
            Some(Inbound::Message(_, frames)) => return Ok(frames),
            Some(Inbound::PeerLost(_)) => {}
            Some(Inbound::Closed) => return Err(PeerError::Closed),
            None => return Err(PeerError::Timeout { timeout }),
        }
    }
}
