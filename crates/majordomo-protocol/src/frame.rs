//! Frames and routing envelopes.

use std::fmt;

/// A single opaque frame of a multipart message.
pub type Frame = Vec<u8>;

/// Reverse path to a peer through zero or more routers.
///
/// The envelope is never interpreted: it is captured from an inbound message
/// and replayed verbatim on the matching outbound message. The first frame is
/// the identity of the directly connected peer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RoutingEnvelope {
    frames: Vec<Frame>,
}

impl RoutingEnvelope {
    /// Builds an envelope from its frames.
    #[must_use]
    pub const fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Builds an envelope addressing a single directly connected peer.
    #[must_use]
    pub fn peer(identity: impl Into<Frame>) -> Self {
        Self {
            frames: vec![identity.into()],
        }
    }

    /// Returns the envelope frames in order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consumes the envelope, returning its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// Returns true when the envelope carries no frames.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Identity of the directly connected peer, when present.
    #[must_use]
    pub fn next_hop(&self) -> Option<&[u8]> {
        self.frames.first().map(Vec::as_slice)
    }

    /// Returns a copy of the envelope without its first frame.
    ///
    /// Routers use this when forwarding to the next hop, which only needs to
    /// see the remainder of the path.
    #[must_use]
    pub fn without_next_hop(&self) -> Self {
        Self {
            frames: self.frames.iter().skip(1).cloned().collect(),
        }
    }
}

impl fmt::Debug for RoutingEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.frames.iter().map(|frame| HexFrame(frame)))
            .finish()
    }
}

impl fmt::Display for RoutingEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                formatter.write_str("/")?;
            }
            write!(formatter, "{:?}", HexFrame(frame))?;
        }
        Ok(())
    }
}

struct HexFrame<'a>(&'a [u8]);

impl fmt::Debug for HexFrame<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.0) {
            Ok(text) if !text.is_empty() && text.chars().all(|ch| ch.is_ascii_graphic()) => {
                formatter.write_str(text)
            }
            _ => {
                for byte in self.0 {
                    write!(formatter, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Splits a frame list at the first empty delimiter frame.
///
/// Frames before the delimiter become the routing envelope; frames after it
/// are the payload. When no delimiter is present every frame is treated as
/// envelope and the payload is empty, which no protocol decoder accepts.
#[must_use]
pub fn split_envelope(mut frames: Vec<Frame>) -> (RoutingEnvelope, Vec<Frame>) {
    match frames.iter().position(Vec::is_empty) {
        Some(delimiter) => {
            let payload = frames.split_off(delimiter + 1);
            frames.truncate(delimiter);
            (RoutingEnvelope::new(frames), payload)
        }
        None => (RoutingEnvelope::new(frames), Vec::new()),
    }
}

/// Joins an envelope and a payload, inserting the empty delimiter frame.
#[must_use]
pub fn join_envelope(envelope: RoutingEnvelope, payload: Vec<Frame>) -> Vec<Frame> {
    let mut frames = envelope.into_frames();
    frames.reserve(payload.len() + 1);
    frames.push(Frame::new());
    frames.extend(payload);
    frames
}
