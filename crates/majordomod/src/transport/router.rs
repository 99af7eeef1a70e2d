//! Router connection: binds an endpoint and addresses each accepted peer by a
//! generated identity frame.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use majordomo_config::SocketEndpoint;
use majordomo_protocol::wire::{read_message, write_message};
use majordomo_protocol::{Frame, RoutingEnvelope, join_envelope, split_envelope};
use tracing::{debug, warn};
use uuid::Uuid;

use super::listener::{ListenerHandle, SocketListener};
use super::{
    Connection, ConnectionHandler, ConnectionStream, Inbound, ListenerError, TRANSPORT_TARGET,
    TransportError, lock,
};

/// Tuning for a [`RouterConnection`].
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    /// Write timeout applied to every peer stream.
    pub send_timeout: Duration,
    /// Capacity of the inbound queue shared by all peer readers.
    pub queue_capacity: usize,
}

type PeerStream = Arc<Mutex<ConnectionStream>>;

/// Writers for every connected peer, keyed by identity frame.
#[derive(Debug, Default)]
struct PeerTable {
    peers: Mutex<HashMap<Frame, PeerStream>>,
}

impl PeerTable {
    fn insert(&self, identity: Frame, stream: ConnectionStream) {
        lock(&self.peers).insert(identity, Arc::new(Mutex::new(stream)));
    }

    fn get(&self, identity: &[u8]) -> Option<PeerStream> {
        lock(&self.peers).get(identity).cloned()
    }

    fn remove(&self, identity: &[u8]) -> Option<PeerStream> {
        lock(&self.peers).remove(identity)
    }

    fn drain(&self) -> Vec<PeerStream> {
        lock(&self.peers).drain().map(|(_, stream)| stream).collect()
    }
}

/// Server side of the broker transport.
///
/// Each accepted peer is assigned a fresh UUID v4 identity frame which is
/// prepended to every message it sends. Outbound messages are routed by the
/// first envelope frame and the remainder of the envelope is written ahead of
/// the delimiter, so multi-hop reverse paths survive intact.
pub struct RouterConnection {
    endpoint: SocketEndpoint,
    local_addr: Option<SocketAddr>,
    peers: Arc<PeerTable>,
    inbound: Receiver<Inbound>,
    closing: Receiver<()>,
    close_signal: Mutex<Option<Sender<()>>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl RouterConnection {
    /// Binds `endpoint` and starts accepting peers.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the endpoint cannot be bound.
    pub fn bind(endpoint: &SocketEndpoint, settings: RouterSettings) -> Result<Self, ListenerError> {
        let listener = SocketListener::bind(endpoint)?;
        let local_addr = listener.local_addr();
        let (inbound_tx, inbound) = channel::bounded(settings.queue_capacity.max(1));
        let (close_signal, closing) = channel::bounded::<()>(0);
        let peers = Arc::new(PeerTable::default());
        let acceptor = Arc::new(Acceptor {
            peers: Arc::clone(&peers),
            inbound: inbound_tx,
            closing: closing.clone(),
            send_timeout: settings.send_timeout,
        });
        let handle = listener.start(acceptor)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            local_addr,
            peers,
            inbound,
            closing,
            close_signal: Mutex::new(Some(close_signal)),
            listener: Mutex::new(Some(handle)),
        })
    }

    /// Endpoint peers can connect to; TCP port 0 is resolved to the real port.
    #[must_use]
    pub fn endpoint(&self) -> SocketEndpoint {
        match (&self.endpoint, self.local_addr) {
            (SocketEndpoint::Tcp { host, .. }, Some(addr)) => {
                SocketEndpoint::tcp(host.clone(), addr.port())
            }
            (endpoint, _) => endpoint.clone(),
        }
    }
}

impl Connection for RouterConnection {
    fn receive(&self) -> Inbound {
        select! {
            recv(self.inbound) -> event => event.unwrap_or(Inbound::Closed),
            recv(self.closing) -> _ => Inbound::Closed,
        }
    }

    fn receive_timeout(&self, timeout: Duration) -> Option<Inbound> {
        select! {
            recv(self.inbound) -> event => Some(event.unwrap_or(Inbound::Closed)),
            recv(self.closing) -> _ => Some(Inbound::Closed),
            default(timeout) => None,
        }
    }

    fn send(&self, envelope: &RoutingEnvelope, frames: Vec<Frame>) -> Result<(), TransportError> {
        let Some(next_hop) = envelope.next_hop() else {
            return Err(TransportError::peer_unavailable("<empty envelope>"));
        };
        let peer = self
            .peers
            .get(next_hop)
            .ok_or_else(|| TransportError::peer_unavailable(envelope))?;
        let message = join_envelope(envelope.without_next_hop(), frames);

        let mut stream = lock(&peer);
        if let Err(source) = write_message(&mut *stream, &message) {
            stream.shutdown();
            self.peers.remove(next_hop);
            return Err(TransportError::Send {
                identity: envelope.to_string(),
                source,
            });
        }
        Ok(())
    }

    fn close(&self) {
        if lock(&self.close_signal).take().is_none() {
            return;
        }
        if let Some(listener) = lock(&self.listener).take()
            && let Err(error) = listener.join()
        {
            warn!(
                target: TRANSPORT_TARGET,
                endpoint = %self.endpoint,
                error = %error,
                "listener did not stop cleanly"
            );
        }
        for peer in self.peers.drain() {
            lock(&peer).shutdown();
        }
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %self.endpoint,
            "router connection closed"
        );
    }
}

impl Drop for RouterConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accept handler: registers the peer, then pumps its messages inbound.
struct Acceptor {
    peers: Arc<PeerTable>,
    inbound: Sender<Inbound>,
    closing: Receiver<()>,
    send_timeout: Duration,
}

impl Acceptor {
    /// Queues an event, giving up once the connection is closing.
    fn deliver(&self, event: Inbound) -> bool {
        select! {
            send(self.inbound, event) -> sent => sent.is_ok(),
            recv(self.closing) -> _ => false,
        }
    }
}

impl ConnectionHandler for Acceptor {
    fn handle(&self, mut stream: ConnectionStream) {
        let identity = Uuid::new_v4().as_bytes().to_vec();
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to clone accepted stream"
                );
                return;
            }
        };
        if let Err(error) = writer.set_write_timeout(Some(self.send_timeout)) {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to set peer write timeout"
            );
        }
        let peer = RoutingEnvelope::peer(identity.clone());
        self.peers.insert(identity.clone(), writer);
        debug!(target: TRANSPORT_TARGET, peer = %peer, "peer connected");

        loop {
            match read_message(&mut stream) {
                Ok(Some(mut frames)) => {
                    frames.insert(0, identity.clone());
                    let (envelope, payload) = split_envelope(frames);
                    if !self.deliver(Inbound::Message(envelope, payload)) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    debug!(
                        target: TRANSPORT_TARGET,
                        peer = %peer,
                        error = %error,
                        "peer read failed"
                    );
                    break;
                }
            }
        }

        if let Some(writer) = self.peers.remove(&identity) {
            lock(&writer).shutdown();
        }
        debug!(target: TRANSPORT_TARGET, peer = %peer, "peer disconnected");
        self.deliver(Inbound::PeerLost(identity));
    }
}
