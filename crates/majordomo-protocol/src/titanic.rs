//! Durable gateway (`TITANIC`) codec.
//!
//! Requests take the form `[TITANIC][command][args...]` and replies the form
//! `[TITANIC][status][data?]`. Commands and statuses are ASCII words so the
//! protocol can be driven from any frame-capable client.

use crate::client::decode_service;
use crate::error::ProtocolError;
use crate::frame::Frame;

/// Header frame identifying the durable gateway protocol.
pub const TITANIC_HEADER: &[u8] = b"TITANIC";

const SAVE: &[u8] = b"SAVE";
const FETCH: &[u8] = b"FETCH";
const CLOSE: &[u8] = b"CLOSE";

const OK: &[u8] = b"OK";
const PENDING: &[u8] = b"PENDING";
const UNKNOWN: &[u8] = b"UNKNOWN";
const ERROR: &[u8] = b"ERROR";

/// Requests accepted by the durable gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitanicRequest {
    /// Persist `body` for later delivery to `service`.
    Save {
        /// Target service name.
        service: String,
        /// Opaque request body.
        body: Frame,
    },
    /// Poll the state of a previously saved request.
    Fetch {
        /// Identifier returned by `Save`.
        id: String,
    },
    /// Acknowledge and delete a request.
    Close {
        /// Identifier returned by `Save`.
        id: String,
    },
}

impl TitanicRequest {
    /// Decodes the payload frames that follow the envelope delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] when the header, command,
    /// or argument count is wrong.
    pub fn decode(frames: Vec<Frame>) -> Result<Self, ProtocolError> {
        let mut frames = frames.into_iter();
        let header = frames.next().unwrap_or_default();
        if header != TITANIC_HEADER {
            return Err(ProtocolError::malformed("titanic header mismatch"));
        }
        let command = frames
            .next()
            .ok_or_else(|| ProtocolError::malformed("titanic command is missing"))?;
        let args: Vec<Frame> = frames.collect();

        match command.as_slice() {
            SAVE => {
                let [service, body]: [Frame; 2] = args
                    .try_into()
                    .map_err(|_| ProtocolError::malformed("SAVE expects a service and a body"))?;
                Ok(Self::Save {
                    service: decode_service(service)?,
                    body,
                })
            }
            FETCH => Ok(Self::Fetch {
                id: decode_id(args, "FETCH")?,
            }),
            CLOSE => Ok(Self::Close {
                id: decode_id(args, "CLOSE")?,
            }),
            _ => Err(ProtocolError::malformed("unknown titanic command")),
        }
    }

    /// Encodes the request into payload frames (without envelope).
    #[must_use]
    pub fn encode(self) -> Vec<Frame> {
        let mut frames = vec![TITANIC_HEADER.to_vec()];
        match self {
            Self::Save { service, body } => {
                frames.push(SAVE.to_vec());
                frames.push(service.into_bytes());
                frames.push(body);
            }
            Self::Fetch { id } => {
                frames.push(FETCH.to_vec());
                frames.push(id.into_bytes());
            }
            Self::Close { id } => {
                frames.push(CLOSE.to_vec());
                frames.push(id.into_bytes());
            }
        }
        frames
    }
}

fn decode_id(args: Vec<Frame>, command: &str) -> Result<String, ProtocolError> {
    let [id]: [Frame; 1] = args
        .try_into()
        .map_err(|_| ProtocolError::malformed(format!("{command} expects exactly one id")))?;
    String::from_utf8(id).map_err(|_| ProtocolError::malformed(format!("{command} id is not UTF-8")))
}

/// Replies produced by the durable gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitanicReply {
    /// `OK [data]`: the request succeeded. `Save` carries the new id, `Fetch`
    /// the result body, and `Close` nothing.
    Ok {
        /// Optional payload accompanying the status.
        data: Option<Frame>,
    },
    /// `PENDING`: the request is stored but no result is available yet.
    Pending,
    /// `UNKNOWN`: the id was never issued or has already been closed.
    Unknown,
    /// `ERROR reason`: the gateway could not serve the request.
    Error {
        /// Human-readable failure description.
        reason: String,
    },
}

impl TitanicReply {
    /// Builds an `OK` reply carrying `data`.
    #[must_use]
    pub fn ok_with(data: impl Into<Frame>) -> Self {
        Self::Ok {
            data: Some(data.into()),
        }
    }

    /// Builds a bare `OK` reply.
    #[must_use]
    pub const fn ok() -> Self {
        Self::Ok { data: None }
    }

    /// Builds an `ERROR` reply.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Decodes reply frames that follow the envelope delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] when the header or status
    /// is not recognised.
    pub fn decode(frames: Vec<Frame>) -> Result<Self, ProtocolError> {
        let mut frames = frames.into_iter();
        let header = frames.next().unwrap_or_default();
        if header != TITANIC_HEADER {
            return Err(ProtocolError::malformed("titanic header mismatch"));
        }
        let status = frames
            .next()
            .ok_or_else(|| ProtocolError::malformed("titanic status is missing"))?;
        let data = frames.next();
        if frames.next().is_some() {
            return Err(ProtocolError::malformed("titanic reply has trailing frames"));
        }

        match (status.as_slice(), data) {
            (OK, data) => Ok(Self::Ok { data }),
            (PENDING, None) => Ok(Self::Pending),
            (UNKNOWN, None) => Ok(Self::Unknown),
            (ERROR, reason) => Ok(Self::Error {
                reason: reason
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default(),
            }),
            _ => Err(ProtocolError::malformed("unknown titanic status")),
        }
    }

    /// Encodes the reply into payload frames (without envelope).
    #[must_use]
    pub fn encode(self) -> Vec<Frame> {
        let mut frames = vec![TITANIC_HEADER.to_vec()];
        match self {
            Self::Ok { data } => {
                frames.push(OK.to_vec());
                frames.extend(data);
            }
            Self::Pending => frames.push(PENDING.to_vec()),
            Self::Unknown => frames.push(UNKNOWN.to_vec()),
            Self::Error { reason } => {
                frames.push(ERROR.to_vec());
                frames.push(reason.into_bytes());
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn frames(parts: &[&[u8]]) -> Vec<Frame> {
        parts.iter().map(|part| part.to_vec()).collect()
    }

    #[test]
    fn decodes_save() {
        let request = TitanicRequest::decode(frames(&[b"TITANIC", b"SAVE", b"echo", b""]))
            .expect("decode save");
        assert_eq!(
            request,
            TitanicRequest::Save {
                service: "echo".to_owned(),
                body: Vec::new(),
            }
        );
    }

    #[rstest]
    #[case::fetch(TitanicRequest::Fetch { id: "abc".to_owned() })]
    #[case::close(TitanicRequest::Close { id: "abc".to_owned() })]
    fn id_requests_survive_encoding(#[case] request: TitanicRequest) {
        let decoded = TitanicRequest::decode(request.clone().encode()).expect("decode");
        assert_eq!(decoded, request);
    }

    #[rstest]
    #[case::bad_header(frames(&[b"MDPC01", b"SAVE", b"echo", b"x"]))]
    #[case::missing_command(frames(&[b"TITANIC"]))]
    #[case::unknown_command(frames(&[b"TITANIC", b"TO_STORE", b"echo", b"x"]))]
    #[case::save_without_body(frames(&[b"TITANIC", b"SAVE", b"echo"]))]
    #[case::fetch_extra_frame(frames(&[b"TITANIC", b"FETCH", b"a", b"b"]))]
    fn rejects_malformed_requests(#[case] input: Vec<Frame>) {
        assert!(TitanicRequest::decode(input).is_err());
    }

    #[test]
    fn error_reply_carries_reason() {
        let encoded = TitanicReply::error("disk full").encode();
        assert_eq!(encoded, frames(&[b"TITANIC", b"ERROR", b"disk full"]));
        assert_eq!(
            TitanicReply::decode(encoded).expect("decode"),
            TitanicReply::error("disk full")
        );
    }

    #[test]
    fn ok_reply_distinguishes_empty_data_from_none() {
        let with_empty = TitanicReply::ok_with(Vec::new());
        let decoded = TitanicReply::decode(with_empty.clone().encode()).expect("decode");
        assert_eq!(decoded, with_empty);
        assert_eq!(
            TitanicReply::decode(TitanicReply::ok().encode()).expect("decode"),
            TitanicReply::ok()
        );
    }
}
