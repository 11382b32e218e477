//! Frame encode/decode for [`Message`] over a length-delimited byte stream.
//!
//! The wire format is: a 4-byte big-endian length prefix (handled by
//! [`tokio_util::codec::LengthDelimitedCodec`]), the `bincode`-encoded
//! [`Message`], followed by a trailing `\n` byte appended by the writer as a
//! human-visible frame boundary when eyeballing a raw capture. The trailing
//! byte carries no protocol meaning and is not consumed by the codec itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::LengthDelimitedCodec;

use crate::payload::Message;

/// Errors that can occur while encoding or decoding a single frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying length-delimited framing failed (I/O error, frame too large, etc).
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The frame's bytes could not be deserialized into a [`Message`].
    #[error("message decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Trailing marker byte appended after every encoded frame.
pub const FRAME_TRAILER: u8 = b'\n';

/// Wraps a [`LengthDelimitedCodec`] to encode/decode [`Message`] values
/// instead of raw byte frames.
///
/// Kept as a thin wrapper (rather than folding bincode directly into a
/// `tokio_util::codec::Decoder` impl) so the length-delimited framing and the
/// payload serialization can vary independently.
#[derive(Default)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    /// Creates a codec with the default framing configuration.
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::new(),
        }
    }

    /// Returns the underlying length-delimited codec, for constructing a
    /// `Framed<TcpStream, LengthDelimitedCodec>` transport.
    pub fn into_inner(self) -> LengthDelimitedCodec {
        self.inner
    }

    /// Serializes a message and appends the trailing marker byte.
    pub fn encode_message(message: &Message) -> Result<Bytes, FrameError> {
        let body = bincode::serialize(message)?;
        let mut buf = BytesMut::with_capacity(body.len() + 1);
        buf.put_slice(&body);
        buf.put_u8(FRAME_TRAILER);
        Ok(buf.freeze())
    }

    /// Deserializes a message from a received frame, stripping the trailing
    /// marker byte if present.
    pub fn decode_message(mut frame: BytesMut) -> Result<Message, FrameError> {
        if frame.last() == Some(&FRAME_TRAILER) {
            frame.truncate(frame.len() - 1);
        }
        let message = bincode::deserialize(&frame.chunk()[..frame.remaining()])?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    #[test]
    fn round_trips_a_message() {
        let message = Message {
            sender_id: 42,
            payload: Payload::Heartbeat,
        };
        let encoded = FrameCodec::encode_message(&message).unwrap();
        assert_eq!(*encoded.last().unwrap(), FRAME_TRAILER);
        let decoded = FrameCodec::decode_message(BytesMut::from(&encoded[..])).unwrap();
        assert_eq!(decoded.sender_id, 42);
        assert!(matches!(decoded.payload, Payload::Heartbeat));
    }

    #[test]
    fn decodes_without_trailer_too() {
        let message = Message {
            sender_id: 7,
            payload: Payload::LogoutRequest,
        };
        let body = bincode::serialize(&message).unwrap();
        let decoded = FrameCodec::decode_message(BytesMut::from(&body[..])).unwrap();
        assert_eq!(decoded.sender_id, 7);
    }
}
