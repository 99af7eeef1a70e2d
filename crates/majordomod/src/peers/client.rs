//! Request/reply clients for the broker and the durable gateway.

use std::thread;
use std::time::{Duration, Instant};

use majordomo_config::SocketEndpoint;
use majordomo_protocol::{ClientCommand, Frame, TitanicReply, TitanicRequest};
use tracing::{debug, warn};

use super::{PEER_TARGET, PeerError, round_trip};
use crate::transport::{Connection, DealerConnection};

/// Synchronous broker client: one request in flight at a time.
///
/// A request that times out leaves its reply on the way, so the client drops
/// that connection and, when it knows the endpoint, dials a fresh one.
pub struct MajordomoClient {
    connection: Box<dyn Connection>,
    endpoint: Option<SocketEndpoint>,
    timeout: Duration,
}

impl MajordomoClient {
    /// Connects to the broker's client endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Transport`] when the broker is unreachable.
    pub fn connect(endpoint: &SocketEndpoint, timeout: Duration) -> Result<Self, PeerError> {
        let connection = DealerConnection::connect(endpoint, timeout, timeout)?;
        Ok(Self {
            connection: Box::new(connection),
            endpoint: Some(endpoint.clone()),
            timeout,
        })
    }

    /// Wraps an existing connection. Such a client cannot redial, so after a
    /// timeout every further request fails.
    #[must_use]
    pub fn over(connection: Box<dyn Connection>, timeout: Duration) -> Self {
        Self {
            connection,
            endpoint: None,
            timeout,
        }
    }

    /// Sends `body` to `service` and returns the reply body.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the request cannot be sent, no reply
    /// arrives within the timeout, or the reply is for another service.
    pub fn request(&mut self, service: &str, body: &[u8]) -> Result<Frame, PeerError> {
        let outcome = round_trip(
            self.connection.as_ref(),
            ClientCommand::request(service, body.to_vec()).encode(),
            self.timeout,
        );
        if matches!(outcome, Err(PeerError::Timeout { .. })) {
            self.redial();
        }
        let frames = outcome?;
        match ClientCommand::decode(frames)? {
            ClientCommand::Reply {
                service: replied,
                body,
            } if replied == service => Ok(body),
            other => Err(PeerError::Unexpected {
                detail: format!("{other:?}"),
            }),
        }
    }
}

impl MajordomoClient {
    fn redial(&mut self) {
        self.connection.close();
        let Some(endpoint) = &self.endpoint else {
            return;
        };
        match DealerConnection::connect(endpoint, self.timeout, self.timeout) {
            Ok(fresh) => self.connection = Box::new(fresh),
            Err(error) => warn!(
                target: PEER_TARGET,
                endpoint = %endpoint,
                error = %error,
                "could not reconnect after timeout"
            ),
        }
    }
}

impl Drop for MajordomoClient {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// Result of polling a durable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker's reply.
    Ready(Frame),
    /// Not delivered yet.
    Pending,
    /// Never issued or already closed.
    Unknown,
}

/// Result of acknowledging a durable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The record was deleted.
    Closed,
    /// Nothing matched the id.
    Unknown,
}

/// Client for the durable gateway.
pub struct TitanicClient {
    connection: Box<dyn Connection>,
    timeout: Duration,
}

impl TitanicClient {
    /// Connects to the gateway endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Transport`] when the gateway is unreachable.
    pub fn connect(endpoint: &SocketEndpoint, timeout: Duration) -> Result<Self, PeerError> {
        let connection = DealerConnection::connect(endpoint, timeout, timeout)?;
        Ok(Self::over(Box::new(connection), timeout))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub fn over(connection: Box<dyn Connection>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    fn call(&self, request: TitanicRequest) -> Result<TitanicReply, PeerError> {
        let frames = round_trip(self.connection.as_ref(), request.encode(), self.timeout)?;
        match TitanicReply::decode(frames)? {
            TitanicReply::Error { reason } => Err(PeerError::Gateway { reason }),
            reply => Ok(reply),
        }
    }

    /// Stores a request for later delivery and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Gateway`] when the gateway could not persist it.
    pub fn save(&self, service: &str, body: &[u8]) -> Result<String, PeerError> {
        let reply = self.call(TitanicRequest::Save {
            service: service.to_owned(),
            body: body.to_vec(),
        })?;
        match reply {
            TitanicReply::Ok { data: Some(id) } => {
                String::from_utf8(id).map_err(|_| PeerError::Unexpected {
                    detail: "request id is not UTF-8".to_owned(),
                })
            }
            other => Err(PeerError::Unexpected {
                detail: format!("{other:?}"),
            }),
        }
    }

    /// Polls a saved request.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the gateway cannot be reached.
    pub fn fetch(&self, id: &str) -> Result<FetchOutcome, PeerError> {
        match self.call(TitanicRequest::Fetch { id: id.to_owned() })? {
            TitanicReply::Ok { data } => Ok(FetchOutcome::Ready(data.unwrap_or_default())),
            TitanicReply::Pending => Ok(FetchOutcome::Pending),
            TitanicReply::Unknown => Ok(FetchOutcome::Unknown),
            TitanicReply::Error { reason } => Err(PeerError::Gateway { reason }),
        }
    }

    /// Acknowledges and deletes a request.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the gateway cannot be reached.
    pub fn close(&self, id: &str) -> Result<CloseOutcome, PeerError> {
        match self.call(TitanicRequest::Close { id: id.to_owned() })? {
            TitanicReply::Ok { .. } => Ok(CloseOutcome::Closed),
            TitanicReply::Unknown => Ok(CloseOutcome::Unknown),
            other => Err(PeerError::Unexpected {
                detail: format!("{other:?}"),
            }),
        }
    }

    /// Saves a request, polls until its result arrives, then closes it.
    ///
    /// Gives up with [`PeerError::Timeout`] once `patience` elapses, leaving
    /// the record in place so it can be fetched later.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when any gateway call fails or patience runs out.
    pub fn submit(
        &self,
        service: &str,
        body: &[u8],
        poll_interval: Duration,
        patience: Duration,
    ) -> Result<(String, Frame), PeerError> {
        let id = self.save(service, body)?;
        let deadline = Instant::now() + patience;
        loop {
            match self.fetch(&id)? {
                FetchOutcome::Ready(result) => {
                    self.close(&id)?;
                    return Ok((id, result));
                }
                FetchOutcome::Pending if Instant::now() < deadline => {
                    debug!(target: PEER_TARGET, id = %id, "still pending");
                    thread::sleep(poll_interval);
                }
                FetchOutcome::Pending => return Err(PeerError::Timeout { timeout: patience }),
                FetchOutcome::Unknown => {
                    return Err(PeerError::Unexpected {
                        detail: format!("request {id} vanished before completing"),
                    });
                }
            }
        }
    }
}

impl Drop for TitanicClient {
    fn drop(&mut self) {
        self.connection.close();
    }
}
