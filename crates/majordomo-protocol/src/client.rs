//! Client protocol (`MDPC01`) codec.

use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::Frame;

/// Header frame identifying the client protocol.
pub const CLIENT_HEADER: &[u8] = b"MDPC01";

/// Commands exchanged between clients and the broker.
///
/// Both shapes carry four frames after the envelope delimiter:
/// `[MDPC01][command][service][body]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Client asks a named service to handle `body`.
    Request {
        /// Target service name.
        service: String,
        /// Opaque request body, possibly empty.
        body: Frame,
    },
    /// Broker returns a worker's reply for `service`.
    Reply {
        /// Service that produced the reply.
        service: String,
        /// Opaque reply body, possibly empty.
        body: Frame,
    },
}

impl ClientCommand {
    /// Builds a request command.
    #[must_use]
    pub fn request(service: impl Into<String>, body: impl Into<Frame>) -> Self {
        Self::Request {
            service: service.into(),
            body: body.into(),
        }
    }

    /// Builds a reply command.
    #[must_use]
    pub fn reply(service: impl Into<String>, body: impl Into<Frame>) -> Self {
        Self::Reply {
            service: service.into(),
            body: body.into(),
        }
    }

    /// Decodes the payload frames that follow the envelope delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] when the frame count,
    /// header, command, or service name do not match the client protocol.
    pub fn decode(frames: Vec<Frame>) -> Result<Self, ProtocolError> {
        let [header, command, service, body]: [Frame; 4] =
            frames.try_into().map_err(|frames: Vec<Frame>| {
                ProtocolError::malformed(format!(
                    "client message has {} frames, expected 4",
                    frames.len()
                ))
            })?;

        if header != CLIENT_HEADER {
            return Err(ProtocolError::malformed("client header mismatch"));
        }
        let service = decode_service(service)?;
        match Command::from_frame(&command) {
            Some(Command::Request) => Ok(Self::Request { service, body }),
            Some(Command::Reply) => Ok(Self::Reply { service, body }),
            Some(other) => Err(ProtocolError::malformed(format!(
                "command {other} is not valid in the client protocol"
            ))),
            None => Err(ProtocolError::malformed("unknown client command")),
        }
    }

    /// Encodes the command into payload frames (without envelope).
    #[must_use]
    pub fn encode(self) -> Vec<Frame> {
        let (command, service, body) = match self {
            Self::Request { service, body } => (Command::Request, service, body),
            Self::Reply { service, body } => (Command::Reply, service, body),
        };
        vec![
            CLIENT_HEADER.to_vec(),
            command.to_frame(),
            service.into_bytes(),
            body,
        ]
    }
}

pub(crate) fn decode_service(frame: Frame) -> Result<String, ProtocolError> {
    if frame.is_empty() {
        return Err(ProtocolError::malformed("service name is empty"));
    }
    String::from_utf8(frame).map_err(|_| ProtocolError::malformed("service name is not UTF-8"))
}
