//! Test doubles for the transport module.

use std::collections::{HashSet, VecDeque};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;
use std::time::Duration;

use majordomo_protocol::{Frame, RoutingEnvelope, WireError};

use super::{Connection, ConnectionHandler, ConnectionStream, Inbound, TransportError, lock};

/// Upper bound on how long an empty [`RecordingConnection`] pretends to wait.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Accept handler that only counts connections.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// One message captured by [`RecordingConnection::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMessage {
    pub(crate) envelope: RoutingEnvelope,
    pub(crate) frames: Vec<Frame>,
}

/// In-memory connection that replays scripted inbound events and records
/// every send.
#[derive(Debug, Default)]
pub(crate) struct RecordingConnection {
    inbound: Mutex<VecDeque<Inbound>>,
    sent: Mutex<Vec<SentMessage>>,
    unreachable: Mutex<HashSet<Frame>>,
    closed: AtomicUsize,
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_inbound(&self, event: Inbound) {
        lock(&self.inbound).push_back(event);
    }

    /// Makes every send whose next hop is `identity` fail.
    pub(crate) fn make_unreachable(&self, identity: &[u8]) {
        lock(&self.unreachable).insert(identity.to_vec());
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    /// Drains and returns the messages captured so far.
    pub(crate) fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for RecordingConnection {
    fn receive(&self) -> Inbound {
        lock(&self.inbound).pop_front().unwrap_or(Inbound::Closed)
    }

    fn receive_timeout(&self, timeout: Duration) -> Option<Inbound> {
        let next = lock(&self.inbound).pop_front();
        if next.is_none() {
            thread::sleep(timeout.min(IDLE_WAIT));
        }
        next
    }

    fn send(&self, envelope: &RoutingEnvelope, frames: Vec<Frame>) -> Result<(), TransportError> {
        if let Some(hop) = envelope.next_hop()
            && lock(&self.unreachable).contains(hop)
        {
            return Err(TransportError::Send {
                identity: envelope.to_string(),
                source: WireError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
            });
        }
        lock(&self.sent).push(SentMessage {
            envelope: envelope.clone(),
            frames,
        });
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
