//! The duplex message channel every broker component talks through.

use std::time::Duration;

use majordomo_protocol::{Frame, RoutingEnvelope};

use super::TransportError;

/// One event delivered by [`Connection::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A message with its reverse-path envelope and payload frames.
    Message(RoutingEnvelope, Vec<Frame>),
    /// A directly connected peer went away. Carries the identity frame that
    /// used to be the first hop of that peer's envelopes.
    PeerLost(Frame),
    /// The connection is closed and will deliver nothing further.
    Closed,
}

/// Addressable duplex channel of multipart messages.
///
/// Inbound messages arrive as the envelope (frames before the first empty
/// delimiter) plus the payload after it. Outbound messages are addressed by
/// an envelope; the connection inserts the delimiter.
pub trait Connection: Send + Sync {
    /// Blocks until the next inbound event.
    fn receive(&self) -> Inbound;

    /// Waits up to `timeout` for the next inbound event.
    ///
    /// Returns `None` when the timeout elapses first.
    fn receive_timeout(&self, timeout: Duration) -> Option<Inbound>;

    /// Sends `frames` to the peer addressed by `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the peer is unknown, the write fails,
    /// or the write exceeds its timeout.
    fn send(&self, envelope: &RoutingEnvelope, frames: Vec<Frame>) -> Result<(), TransportError>;

    /// Closes the connection, unblocking any pending `receive`.
    fn close(&self);
}
