//! Dealer connection: the outbound side of a router endpoint.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use majordomo_config::SocketEndpoint;
use majordomo_protocol::wire::{read_message, write_message};
use majordomo_protocol::{Frame, RoutingEnvelope, join_envelope, split_envelope};
use tracing::debug;

use super::{Connection, ConnectionStream, Inbound, TRANSPORT_TARGET, TransportError, lock};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

const INBOUND_CAPACITY: usize = 64;

/// Client side of the broker transport.
///
/// Messages are written as `[envelope..., EMPTY, payload...]`; with an empty
/// envelope that is just the delimiter followed by the payload, which is what
/// a router expects from a directly connected peer.
pub struct DealerConnection {
    endpoint: SocketEndpoint,
    writer: Mutex<ConnectionStream>,
    inbound: Receiver<Inbound>,
    closing: Receiver<()>,
    close_signal: Mutex<Option<Sender<()>>>,
}

impl DealerConnection {
    /// Connects to `endpoint`.
    ///
    /// `connect_timeout` bounds TCP connection establishment and
    /// `send_timeout` bounds every subsequent write.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the endpoint is unreachable.
    pub fn connect(
        endpoint: &SocketEndpoint,
        connect_timeout: Duration,
        send_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let connect_error = |source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };
        let stream = open_stream(endpoint, connect_timeout).map_err(connect_error)?;
        let reader = stream.try_clone().map_err(connect_error)?;
        stream
            .set_write_timeout(Some(send_timeout))
            .map_err(connect_error)?;

        let (inbound_tx, inbound) = channel::bounded(INBOUND_CAPACITY);
        let (close_signal, closing) = channel::bounded::<()>(0);
        let pump_closing = closing.clone();
        thread::spawn(move || pump(reader, &inbound_tx, &pump_closing));

        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %endpoint,
            "dealer connected"
        );
        Ok(Self {
            endpoint: endpoint.clone(),
            writer: Mutex::new(stream),
            inbound,
            closing,
            close_signal: Mutex::new(Some(close_signal)),
        })
    }

    /// Endpoint this dealer is connected to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }
}

impl Connection for DealerConnection {
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
        if lock(&self.close_signal).is_none() {
            return Err(TransportError::Closed);
        }
        let message = join_envelope(envelope.clone(), frames);
        let mut stream = lock(&self.writer);
        write_message(&mut *stream, &message).map_err(|source| TransportError::Send {
            identity: self.endpoint.to_string(),
            source,
        })
    }

    fn close(&self) {
        if lock(&self.close_signal).take().is_none() {
            return;
        }
        lock(&self.writer).shutdown();
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %self.endpoint,
            "dealer connection closed"
        );
    }
}

impl Drop for DealerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_stream(endpoint: &SocketEndpoint, timeout: Duration) -> io::Result<ConnectionStream> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let mut last_error = None;
            for addr in (host.as_str(), *port).to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(stream) => {
                        stream.set_nodelay(true)?;
                        return Ok(ConnectionStream::Tcp(stream));
                    }
                    Err(error) => last_error = Some(error),
                }
            }
            Err(last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
            }))
        }
        #[cfg(unix)]
        SocketEndpoint::Unix { path } => {
            UnixStream::connect(path.as_std_path()).map(ConnectionStream::Unix)
        }
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are unsupported on this platform",
        )),
    }
}

/// Reads messages until the stream ends, then reports the closure.
fn pump(mut reader: ConnectionStream, inbound: &Sender<Inbound>, closing: &Receiver<()>) {
    let deliver = |event: Inbound| {
        select! {
            send(inbound, event) -> sent => sent.is_ok(),
            recv(closing) -> _ => false,
        }
    };
    loop {
        match read_message(&mut reader) {
            Ok(Some(frames)) => {
                let (envelope, payload) = split_envelope(frames);
                if !deliver(Inbound::Message(envelope, payload)) {
                    return;
                }
            }
            Ok(None) => break,
            Err(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "dealer read failed"
                );
                break;
            }
        }
    }
    deliver(Inbound::Closed);
}
