//! Decoded events posted to the dispatcher mailbox.

use majordomo_protocol::{ClientCommand, Frame, ProtocolError, RoutingEnvelope, WorkerCommand};

use super::BrokerError;

/// One unit of work for the broker dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A client asked `service` to handle `body`.
    ClientRequest {
        /// Reverse path to the client.
        client: RoutingEnvelope,
        /// Requested service.
        service: String,
        /// Opaque request body.
        body: Frame,
    },
    /// A worker sent a protocol command.
    Worker {
        /// Reverse path to the worker, used as its identity.
        identity: RoutingEnvelope,
        /// Decoded command.
        command: WorkerCommand,
    },
    /// The worker-side transport lost a directly connected peer.
    WorkerLost {
        /// Identity frame of the lost peer.
        identity: Frame,
    },
    /// The client-side transport lost a directly connected peer.
    ClientLost {
        /// Identity frame of the lost peer.
        identity: Frame,
    },
}

impl BrokerEvent {
    /// Decodes a message received on the client-facing connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MalformedMessage`] when the payload is not a
    /// client REQUEST.
    pub fn from_client(client: RoutingEnvelope, frames: Vec<Frame>) -> Result<Self, BrokerError> {
        match ClientCommand::decode(frames)? {
            ClientCommand::Request { service, body } => Ok(Self::ClientRequest {
                client,
                service,
                body,
            }),
            ClientCommand::Reply { .. } => Err(ProtocolError::malformed(
                "clients may not send REPLY",
            )
            .into()),
        }
    }

    /// Decodes a message received on the worker-facing connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MalformedMessage`] when the payload is not a
    /// worker command a worker may send.
    pub fn from_worker(identity: RoutingEnvelope, frames: Vec<Frame>) -> Result<Self, BrokerError> {
        let command = WorkerCommand::decode(frames)?;
        if matches!(command, WorkerCommand::Request { .. }) {
            return Err(ProtocolError::malformed("workers may not send REQUEST").into());
        }
        Ok(Self::Worker { identity, command })
    }
}
