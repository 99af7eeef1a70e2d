//! Worker session: READY, then serve requests with heartbeats both ways.

use std::time::{Duration, Instant};

use majordomo_config::SocketEndpoint;
use majordomo_protocol::{Frame, RoutingEnvelope, WorkerCommand};
use tracing::{debug, info, warn};

use super::{PEER_TARGET, PeerError};
use crate::transport::{Connection, DealerConnection, Inbound};

/// What a worker registers for and how it keeps the broker informed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Service announced with READY.
    pub service: String,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Silent intervals tolerated before the broker is presumed dead.
    pub heartbeat_liveness: u32,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The broker sent DISCONNECT.
    Disconnected,
    /// The caller asked the session to stop.
    Stopped,
}

/// One worker's connection to the broker.
pub struct WorkerSession {
    connection: Box<dyn Connection>,
    settings: WorkerSettings,
}

impl WorkerSession {
    /// Connects to the broker's worker endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Transport`] when the broker is unreachable.
    pub fn connect(
        endpoint: &SocketEndpoint,
        settings: WorkerSettings,
        send_timeout: Duration,
    ) -> Result<Self, PeerError> {
        let connection = DealerConnection::connect(endpoint, send_timeout, send_timeout)?;
        Ok(Self::over(Box::new(connection), settings))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub fn over(connection: Box<dyn Connection>, settings: WorkerSettings) -> Self {
        Self {
            connection,
            settings,
        }
    }

    fn send(&self, command: WorkerCommand) -> Result<(), PeerError> {
        self.connection
            .send(&RoutingEnvelope::default(), command.encode())?;
        Ok(())
    }

    /// Registers with the broker and answers requests with `handler` until
    /// the broker disconnects, goes silent, or `stop` returns true.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::BrokerSilent`] when the broker misses
    /// `heartbeat_liveness` intervals, [`PeerError::Closed`] when the
    /// connection drops, or a transport error from a failed send.
    pub fn run(
        &self,
        mut handler: impl FnMut(&[u8]) -> Frame,
        stop: impl Fn() -> bool,
    ) -> Result<SessionEnd, PeerError> {
        let interval = self.settings.heartbeat_interval;
        let liveness = self.settings.heartbeat_liveness.max(1);
        self.send(WorkerCommand::Ready {
            service: self.settings.service.clone(),
        })?;
        info!(
            target: PEER_TARGET,
            service = %self.settings.service,
            "worker registered"
        );

        let mut remaining_liveness = liveness;
        let mut next_heartbeat = Instant::now() + interval;
        loop {
            if stop() {
                self.send(WorkerCommand::Disconnect)?;
                return Ok(SessionEnd::Stopped);
            }
            let wait = next_heartbeat.saturating_duration_since(Instant::now());
            match self.connection.receive_timeout(wait) {
                Some(Inbound::Message(_, frames)) => {
                    remaining_liveness = liveness;
                    match WorkerCommand::decode(frames) {
                        Ok(WorkerCommand::Request { client, body }) => {
                            debug!(target: PEER_TARGET, client = %client, "request received");
                            let reply = handler(&body);
                            self.send(WorkerCommand::Reply {
                                client,
                                body: reply,
                            })?;
                        }
                        Ok(WorkerCommand::Heartbeat) => {}
                        Ok(WorkerCommand::Disconnect) => {
                            info!(target: PEER_TARGET, "broker requested disconnect");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Ok(other) => warn!(
                            target: PEER_TARGET,
                            command = %other.command(),
                            "unexpected command from broker"
                        ),
                        Err(error) => warn!(
                            target: PEER_TARGET,
                            error = %error,
                            "malformed message from broker"
                        ),
                    }
                }
                Some(Inbound::PeerLost(_)) => {}
                Some(Inbound::Closed) => return Err(PeerError::Closed),
                None => {
                    remaining_liveness -= 1;
                    if remaining_liveness == 0 {
                        return Err(PeerError::BrokerSilent {
                            intervals: liveness,
                        });
                    }
                }
            }
            if Instant::now() >= next_heartbeat {
                self.send(WorkerCommand::Heartbeat)?;
                next_heartbeat = Instant::now() + interval;
            }
        }
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        self.connection.close();
    }
}
