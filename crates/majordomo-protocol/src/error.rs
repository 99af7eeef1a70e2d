//! Errors raised while decoding protocol frames.

use thiserror::Error;

/// Errors surfaced when a frame list does not match any known message shape.
///
/// Receivers are expected to log and drop the offending message; a malformed
/// message never terminates a receive loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame count, header, or command did not match a known shape.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// Human-readable description of the mismatch.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates a malformed message error with the given reason.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}
