//! Command bytes shared by the client and worker protocols.

use std::fmt;

/// Single-byte command carried in the frame after the protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Worker advertises readiness for a service.
    Ready,
    /// A request travelling towards a worker.
    Request,
    /// A reply travelling back towards a client.
    Reply,
    /// Liveness signal between broker and worker.
    Heartbeat,
    /// Either side is leaving.
    Disconnect,
}

impl Command {
    /// Returns the wire byte for the command.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Ready => 0x01,
            Self::Request => 0x02,
            Self::Reply => 0x03,
            Self::Heartbeat => 0x04,
            Self::Disconnect => 0x05,
        }
    }

    /// Returns the command encoded as a single frame.
    #[must_use]
    pub fn to_frame(self) -> Vec<u8> {
        vec![self.as_byte()]
    }

    /// Parses a command frame, which must be exactly one known byte.
    #[must_use]
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        match frame {
            [0x01] => Some(Self::Ready),
            [0x02] => Some(Self::Request),
            [0x03] => Some(Self::Reply),
            [0x04] => Some(Self::Heartbeat),
            [0x05] => Some(Self::Disconnect),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Heartbeat => "HEARTBEAT",
            Self::Disconnect => "DISCONNECT",
        };
        formatter.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Command::Ready)]
    #[case(Command::Request)]
    #[case(Command::Reply)]
    #[case(Command::Heartbeat)]
    #[case(Command::Disconnect)]
    fn frame_byte_parses_back(#[case] command: Command) {
        assert_eq!(Command::from_frame(&command.to_frame()), Some(command));
    }

    #[rstest]
    #[case(b"")]
    #[case(b"\x06")]
    #[case(b"\x01\x01")]
    fn rejects_unknown_frames(#[case] frame: &[u8]) {
        assert_eq!(Command::from_frame(frame), None);
    }
}
