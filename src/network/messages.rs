use serde::{Deserialize, Serialize};

use crate::{Action, RoundId};

/// Version written into every [`MessageHeader`]. Peers drop messages carrying any other value.
pub const PROTOCOL_VERSION: u16 = 1;

/// Fixed header in front of every message body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Wire format version of the sender.
    pub version: u16,
}

impl MessageHeader {
    /// The header this build sends.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self::current()
    }
}

/// The three kinds of message two clients exchange.
///
/// Both round-scoped messages carry the sender's [`RoundId`] so a message delayed
/// across a round boundary can be recognized and dropped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageBody {
    /// Sent once right after the channel opens.
    Handshake {
        /// The sender's display name.
        display_name: String,
    },
    /// Sent when the local player commits their action.
    ActionReveal {
        /// The round the action belongs to.
        round: RoundId,
        /// The committed action.
        action: Action,
    },
    /// Sent when the local player asks for the next round.
    RematchReady {
        /// The round whose result the sender has seen.
        round: RoundId,
    },
}

impl MessageBody {
    /// Short name of the message kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::ActionReveal { .. } => "action_reveal",
            Self::RematchReady { .. } => "rematch_ready",
        }
    }
}

/// A message that a [`Channel`] sends and receives.
///
/// [`Channel`]: crate::Channel
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Versioned header.
    pub header: MessageHeader,
    /// Tagged payload.
    pub body: MessageBody,
}

impl Message {
    /// Builds a handshake announcing `display_name`.
    #[must_use]
    pub fn handshake(display_name: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::current(),
            body: MessageBody::Handshake {
                display_name: display_name.into(),
            },
        }
    }

    /// Builds a reveal of `action` for `round`.
    #[must_use]
    pub fn action_reveal(round: RoundId, action: Action) -> Self {
        Self {
            header: MessageHeader::current(),
            body: MessageBody::ActionReveal { round, action },
        }
    }

    /// Builds a rematch-ready signal for `round`.
    #[must_use]
    pub fn rematch_ready(round: RoundId) -> Self {
        Self {
            header: MessageHeader::current(),
            body: MessageBody::RematchReady { round },
        }
    }
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

    #[test]
    fn test_constructors_stamp_current_version() {
        for msg in [
            Message::handshake("Ada"),
            Message::action_reveal(RoundId::new(3), Action::Rock),
            Message::rematch_ready(RoundId::new(3)),
        ] {
            assert_eq!(msg.header.version, PROTOCOL_VERSION);
        }
    }

    #[test]
    fn test_message_body_kind_names() {
        assert_eq!(Message::handshake("x").body.kind(), "handshake");
        assert_eq!(
            Message::action_reveal(RoundId::ZERO, Action::Paper).body.kind(),
            "action_reveal"
        );
        assert_eq!(Message::rematch_ready(RoundId::ZERO).body.kind(), "rematch_ready");
    }

    #[test]
    fn test_message_header_default_is_current() {
        assert_eq!(MessageHeader::default(), MessageHeader::current());
    }

    #[test]
    fn test_json_shape_is_tagged() {
        let json = serde_json::to_string(&Message::action_reveal(RoundId::new(1), Action::Scissors))
            .unwrap();
        assert!(json.contains(r#""ActionReveal""#));
        assert!(json.contains(r#""action":"Scissors""#));
    }
}
