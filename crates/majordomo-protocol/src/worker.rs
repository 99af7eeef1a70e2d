//! Worker protocol (`MDPW01`) codec.

use crate::client::decode_service;
use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::{Frame, RoutingEnvelope};

/// Header frame identifying the worker protocol.
pub const WORKER_HEADER: &[u8] = b"MDPW01";

/// Commands exchanged between workers and the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// `[MDPW01][READY][service]`: worker joins the pool for `service`.
    Ready {
        /// Service the worker handles.
        service: String,
    },
    /// `[MDPW01][REQUEST][client...][EMPTY][body]`: broker hands work over.
    Request {
        /// Reverse path to the client that issued the request.
        client: RoutingEnvelope,
        /// Opaque request body, possibly empty.
        body: Frame,
    },
    /// `[MDPW01][REPLY][client...][EMPTY][body]`: worker returns a result.
    Reply {
        /// Reverse path copied from the matching request.
        client: RoutingEnvelope,
        /// Opaque reply body, possibly empty.
        body: Frame,
    },
    /// `[MDPW01][HEARTBEAT]`: liveness signal.
    Heartbeat,
    /// `[MDPW01][DISCONNECT]`: sender is leaving.
    Disconnect,
}

impl WorkerCommand {
    /// Returns the command byte for this message.
    #[must_use]
    pub const fn command(&self) -> Command {
        match self {
            Self::Ready { .. } => Command::Ready,
            Self::Request { .. } => Command::Request,
            Self::Reply { .. } => Command::Reply,
            Self::Heartbeat => Command::Heartbeat,
            Self::Disconnect => Command::Disconnect,
        }
    }

    /// Decodes the payload frames that follow the envelope delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] when the frames do not match
    /// any worker protocol shape.
    pub fn decode(mut frames: Vec<Frame>) -> Result<Self, ProtocolError> {
        if frames.len() < 2 {
            return Err(ProtocolError::malformed(format!(
                "worker message has {} frames, expected at least 2",
                frames.len()
            )));
        }
        let mut rest = frames.split_off(2);
        let (header, command) = match (frames.pop(), frames.pop()) {
            (Some(command), Some(header)) => (header, command),
            _ => return Err(ProtocolError::malformed("worker message is truncated")),
        };
        if header != WORKER_HEADER {
            return Err(ProtocolError::malformed("worker header mismatch"));
        }
        let command = Command::from_frame(&command)
            .ok_or_else(|| ProtocolError::malformed("unknown worker command"))?;

        match command {
            Command::Ready => {
                let service = rest.pop().filter(|_| rest.is_empty()).ok_or_else(|| {
                    ProtocolError::malformed("READY expects exactly one service frame")
                })?;
                Ok(Self::Ready {
                    service: decode_service(service)?,
                })
            }
            Command::Request | Command::Reply => {
                let (client, body) = decode_routed(rest, command)?;
                if command == Command::Request {
                    Ok(Self::Request { client, body })
                } else {
                    Ok(Self::Reply { client, body })
                }
            }
            Command::Heartbeat | Command::Disconnect => {
                if !rest.is_empty() {
                    return Err(ProtocolError::malformed(format!(
                        "{command} carries {} unexpected frames",
                        rest.len()
                    )));
                }
                if command == Command::Heartbeat {
                    Ok(Self::Heartbeat)
                } else {
                    Ok(Self::Disconnect)
                }
            }
        }
    }

    /// Encodes the command into payload frames (without envelope).
    #[must_use]
    pub fn encode(self) -> Vec<Frame> {
        let command = self.command();
        let mut frames = vec![WORKER_HEADER.to_vec(), command.to_frame()];
        match self {
            Self::Ready { service } => frames.push(service.into_bytes()),
            Self::Request { client, body } | Self::Reply { client, body } => {
                frames.extend(client.into_frames());
                frames.push(Frame::new());
                frames.push(body);
            }
            Self::Heartbeat | Self::Disconnect => {}
        }
        frames
    }
}

/// Splits `[client...][EMPTY][body]` into its envelope and body.
fn decode_routed(
    mut rest: Vec<Frame>,
    command: Command,
) -> Result<(RoutingEnvelope, Frame), ProtocolError> {
    let body = rest.pop();
    let delimiter = rest.pop();
    let (Some(body), Some(delimiter)) = (body, delimiter) else {
        return Err(ProtocolError::malformed(format!(
            "{command} is missing its client envelope or body"
        )));
    };
    if !delimiter.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "{command} is missing the delimiter before its body"
        )));
    }
    if rest.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "{command} carries an empty client envelope"
        )));
    }
    if rest.iter().any(Vec::is_empty) {
        return Err(ProtocolError::malformed(format!(
            "{command} client envelope contains an empty frame"
        )));
    }
    Ok((RoutingEnvelope::new(rest), body))
}
