//! Length-prefixed multipart framing for stream sockets.
//!
//! A message on the wire is a little-endian `u32` frame count followed by
//! each frame as a little-endian `u32` length and its bytes. Empty frames are
//! legal and encode as a zero length.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::frame::Frame;

/// Upper bound on frames in a single message.
pub const MAX_FRAMES: usize = 1024;

/// Upper bound on the total encoded size of a single message.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Failures while reading or writing framed messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying stream failed.
    #[error("wire I/O failed: {0}")]
    Io(#[from] io::Error),
    /// A message declared more frames than [`MAX_FRAMES`].
    #[error("message declares {count} frames, limit is {MAX_FRAMES}")]
    TooManyFrames {
        /// Declared frame count.
        count: usize,
    },
    /// A message exceeded [`MAX_MESSAGE_BYTES`].
    #[error("message of {size} bytes exceeds limit of {MAX_MESSAGE_BYTES}")]
    MessageTooLarge {
        /// Size reached when the limit was crossed.
        size: usize,
    },
}

impl WireError {
    /// Returns true when the error is a read or write timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(error)
                if matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Writes one multipart message in a single `write_all` call.
///
/// # Errors
///
/// Returns [`WireError`] when the message exceeds the limits or the writer
/// fails.
pub fn write_message<W: Write>(writer: &mut W, frames: &[Frame]) -> Result<(), WireError> {
    if frames.len() > MAX_FRAMES {
        return Err(WireError::TooManyFrames {
            count: frames.len(),
        });
    }
    let size = PREFIX_LEN + frames.iter().map(|frame| PREFIX_LEN + frame.len()).sum::<usize>();
    if size > MAX_MESSAGE_BYTES {
        return Err(WireError::MessageTooLarge { size });
    }

    let mut buffer = Vec::with_capacity(size);
    buffer.extend_from_slice(&encode_len(frames.len())?);
    for frame in frames {
        buffer.extend_from_slice(&encode_len(frame.len())?);
        buffer.extend_from_slice(frame);
    }
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(())
}

/// Reads one multipart message.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte of a
/// message. A stream that ends part-way through a message yields an
/// [`io::ErrorKind::UnexpectedEof`] error.
///
/// # Errors
///
/// Returns [`WireError`] when the message exceeds the limits or the reader
/// fails.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Vec<Frame>>, WireError> {
    let mut prefix = [0_u8; PREFIX_LEN];
    if !read_prefix_or_eof(reader, &mut prefix)? {
        return Ok(None);
    }
    let count = decode_len(prefix);
    if count > MAX_FRAMES {
        return Err(WireError::TooManyFrames { count });
    }

    let mut size = PREFIX_LEN;
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        reader.read_exact(&mut prefix)?;
        let len = decode_len(prefix);
        size = size.saturating_add(PREFIX_LEN).saturating_add(len);
        if size > MAX_MESSAGE_BYTES {
            return Err(WireError::MessageTooLarge { size });
        }
        let mut frame = vec![0_u8; len];
        reader.read_exact(&mut frame)?;
        frames.push(frame);
    }
    Ok(Some(frames))
}

/// Fills `prefix`, returning false on EOF before any byte arrived.
fn read_prefix_or_eof<R: Read>(
    reader: &mut R,
    prefix: &mut [u8; PREFIX_LEN],
) -> Result<bool, WireError> {
    let mut filled = 0;
    while let Some(remaining) = prefix.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        match reader.read(remaining) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(WireError::Io(io::ErrorKind::UnexpectedEof.into())),
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(true)
}

fn encode_len(len: usize) -> Result<[u8; PREFIX_LEN], WireError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| WireError::MessageTooLarge { size: len })
}

fn decode_len(prefix: [u8; PREFIX_LEN]) -> usize {
    usize::try_from(u32::from_le_bytes(prefix)).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    #[test]
    fn encodes_empty_frames_as_zero_length() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &[b"ab".to_vec(), Vec::new()]).expect("write");
        assert_eq!(
            buffer,
            vec![2, 0, 0, 0, 2, 0, 0, 0, b'a', b'b', 0, 0, 0, 0]
        );
    }

    #[test]
    fn reads_consecutive_messages_then_clean_eof() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &[b"first".to_vec()]).expect("write first");
        write_message(&mut buffer, &[Vec::new(), b"second".to_vec()]).expect("write second");

        let mut cursor = Cursor::new(buffer);
        assert_eq!(
            read_message(&mut cursor).expect("read first"),
            Some(vec![b"first".to_vec()])
        );
        assert_eq!(
            read_message(&mut cursor).expect("read second"),
            Some(vec![Vec::new(), b"second".to_vec()])
        );
        assert_eq!(read_message(&mut cursor).expect("read eof"), None);
    }

    #[rstest]
    #[case::inside_prefix(vec![1, 0])]
    #[case::inside_frame(vec![1, 0, 0, 0, 5, 0, 0, 0, b'a'])]
    fn truncated_message_is_an_error(#[case] bytes: Vec<u8>) {
        let error = read_message(&mut Cursor::new(bytes)).expect_err("truncated");
        assert!(
            matches!(error, WireError::Io(ref source) if source.kind() == io::ErrorKind::UnexpectedEof)
        );
    }

    #[test]
    fn rejects_excessive_frame_count() {
        let count = u32::try_from(MAX_FRAMES + 1).expect("fits");
        let bytes = count.to_le_bytes().to_vec();
        let error = read_message(&mut Cursor::new(bytes)).expect_err("too many frames");
        assert!(matches!(error, WireError::TooManyFrames { .. }));
    }

    #[test]
    fn rejects_oversized_frame_before_allocating() {
        let mut bytes = 1_u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let error = read_message(&mut Cursor::new(bytes)).expect_err("too large");
        assert!(matches!(error, WireError::MessageTooLarge { .. }));
    }
}
