//! Binary codec for wire messages.
//!
//! All bytes that cross a [`Channel`](crate::Channel) go through this module, so both
//! peers agree on a single bincode configuration.
//!
//! # Examples
//!
//! ```
//! use rps_arena::network::codec::{decode_message, encode_message};
//! use rps_arena::{Action, Message, RoundId};
//!
//! let msg = Message::action_reveal(RoundId::new(2), Action::Paper);
//! let bytes = encode_message(&msg).expect("encoding should succeed");
//! let decoded = decode_message(&bytes).expect("decoding should succeed");
//! assert_eq!(msg, decoded);
//! ```

use std::fmt;

use crate::network::messages::Message;

/// Largest encoded message accepted on the wire.
///
/// Decoding stops at this many bytes, so a length field in a hostile frame can never
/// make the decoder reserve more memory than a legal frame could hold.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

// Fixed-size integers keep the round counter and version at a stable offset,
// which keeps frames from different builds comparable byte for byte.
fn config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_limit::<{ MAX_FRAME_LEN }>()
}

/// Why a frame could not be produced or understood.
///
/// Bincode only reports failures as formatted text, so its message is kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The message could not be serialized.
    Encode(String),
    /// The frame is not a message this build understands.
    Decode(String),
    /// A whole message was read but the frame had more bytes after it.
    TrailingBytes {
        /// Bytes consumed by the message.
        consumed: usize,
        /// Total bytes in the frame.
        provided: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(message) => write!(f, "encoding wire message failed: {message}"),
            Self::Decode(message) => write!(f, "decoding wire message failed: {message}"),
            Self::TrailingBytes { consumed, provided } => write!(
                f,
                "message used {consumed} of {provided} bytes, trailing data rejected"
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a single [`Message`] frame.
pub fn encode_message(msg: &Message) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(msg, config()).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes exactly one [`Message`] from a frame.
///
/// Trailing bytes mean the peer speaks a different format, so the frame is rejected.
pub fn decode_message(bytes: &[u8]) -> CodecResult<Message> {
    let (msg, consumed): (Message, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            provided: bytes.len(),
        });
    }
    Ok(msg)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::messages::{MessageBody, MessageHeader};
    use crate::{Action, RoundId};

    #[test]
    fn test_handshake_survives_encoding() {
        let original = Message::handshake("Ada");
        let bytes = encode_message(&original).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), original);
    }

    #[test]
    fn test_header_comes_first_at_a_fixed_width() {
        let bytes = encode_message(&Message::rematch_ready(RoundId::new(1))).unwrap();
        assert_eq!(&bytes[..2], &crate::PROTOCOL_VERSION.to_le_bytes());
        // version u16, body tag u32, round u32
        assert_eq!(bytes.len(), 2 + 4 + 4);
    }

    #[test]
    fn test_decode_message_rejects_trailing_bytes() {
        let mut bytes = encode_message(&Message::rematch_ready(RoundId::new(0))).unwrap();
        bytes.push(0);
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { .. }));
    }

    #[test]
    fn test_decode_message_rejects_unknown_variant() {
        let mut bytes = encode_message(&Message::action_reveal(RoundId::new(0), Action::Rock)).unwrap();
        // header is a fixed u16; the body tag follows as a fixed u32
        bytes[2] = 0xEE;
        assert!(decode_message(&bytes).is_err());
    }

    #[test]
    fn test_truncated_frame_is_a_decode_error() {
        let bytes = encode_message(&Message::handshake("Ada")).unwrap();
        let err = decode_message(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Encode("test error".to_owned());
        assert!(err.to_string().contains("encoding wire message failed"));

        let err = CodecError::TrailingBytes {
            consumed: 10,
            provided: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("12"));
    }

    /// A handshake whose name length field is valid bincode but far beyond any real frame.
    fn handshake_claiming_name_of(len: u64) -> Vec<u8> {
        let mut bytes = crate::PROTOCOL_VERSION.to_le_bytes().to_vec();
        // Handshake is the first body variant
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_oversized_name_length_is_rejected_without_allocating() {
        let bytes = handshake_claiming_name_of(1 << 46);
        assert_eq!(bytes.len(), 14);
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn test_name_length_just_over_the_frame_limit_is_rejected() {
        let mut bytes = handshake_claiming_name_of(MAX_FRAME_LEN as u64 + 1);
        bytes.resize(bytes.len() + MAX_FRAME_LEN + 1, b'a');
        assert!(matches!(decode_message(&bytes), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let msg = Message {
            header: MessageHeader::current(),
            body: MessageBody::ActionReveal {
                round: RoundId::new(7),
                action: Action::Scissors,
            },
        };
        assert_eq!(encode_message(&msg).unwrap(), encode_message(&msg).unwrap());
    }
}
