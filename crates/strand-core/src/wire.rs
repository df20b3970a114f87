//! Delimiter-framed JSON wire protocol.
//!
//! Messages travel between a relay and its clients as serialized JSON
//! separated by a fixed ASCII delimiter. Splitting on the delimiter assumes
//! payload content does not contain the delimiter bytes themselves; both
//! ends of the wire are trusted on that point. The decoder buffers raw
//! bytes and tolerates delimiters split across reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::warn;

use crate::message::Message;

/// Frame separator on the wire.
pub const FRAME_DELIMITER: &[u8] = b"<-[*0M0*]->";

/// Errors produced by the wire codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A frame's payload was not a valid canonical message.
    #[error("undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Serialize a message and append the frame delimiter.
pub fn encode_frame(message: &Message) -> Result<Bytes, FrameError> {
    let json = serde_json::to_vec(message)?;
    let mut buf = BytesMut::with_capacity(json.len() + FRAME_DELIMITER.len());
    buf.put_slice(&json);
    buf.put_slice(FRAME_DELIMITER);
    Ok(buf.freeze())
}

/// Incremental frame decoder over an arbitrary byte stream.
///
/// Feed it reads as they arrive, then drain completed frames with
/// [`next_frame`](Self::next_frame). A frame that fails to decode yields an
/// error for that frame only; later frames still decode.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if the buffer holds one.
    ///
    /// Returns `None` when no full delimiter has arrived yet; a trailing
    /// partial delimiter stays buffered until the rest of it shows up.
    pub fn next_frame(&mut self) -> Option<Result<Message, FrameError>> {
        let at = find_delimiter(&self.buf)?;
        let payload = self.buf.split_to(at);
        self.buf.advance(FRAME_DELIMITER.len());
        Some(decode_payload(&payload))
    }

    /// Decode whatever remains after the transport closed.
    ///
    /// Handles a final frame the sender did not terminate with a delimiter.
    pub fn finish(&mut self) -> Option<Result<Message, FrameError>> {
        while let Some(frame) = self.next_frame() {
            return Some(frame);
        }
        if self.buf.is_empty() {
            return None;
        }
        let payload = self.buf.split();
        Some(decode_payload(&payload))
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER)
}

fn decode_payload(payload: &[u8]) -> Result<Message, FrameError> {
    serde_json::from_slice(payload).map_err(|e| {
        warn!(len = payload.len(), error = %e, "dropping undecodable frame");
        FrameError::Decode(e)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
