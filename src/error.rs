use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::network::codec::CodecError;
use crate::{MatchPhase, RoundId};

/// Convenience alias for results returned by this crate.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), ArenaError>`].
///
/// Nothing here is fatal to a client. The worst a caller should do on any of these is return the
/// player to the menu.
///
/// [`Result<(), ArenaError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArenaError {
    /// You made an invalid request, usually by passing empty input or an out-of-range setting.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        kind: InvalidRequestKind,
    },
    /// The operation is not offered in the current phase of the match.
    WrongPhase {
        /// The operation that was attempted.
        operation: &'static str,
        /// The phase the match was in.
        phase: MatchPhase,
    },
    /// The local side already committed an action for this round.
    ActionAlreadyCommitted {
        /// The round the action was committed in.
        round: RoundId,
    },
    /// A message was sent while no channel was open.
    ChannelNotOpen,
    /// Dialing the remote endpoint failed because nobody is listening there.
    PeerUnavailable {
        /// The endpoint that could not be reached.
        endpoint: String,
    },
    /// A transport or socket operation failed.
    SocketError {
        /// A description of the socket error.
        context: String,
    },
    /// Serialization or deserialization of a wire message failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

/// Detailed reasons for [`ArenaError::InvalidRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidRequestKind {
    /// The display name was empty after trimming.
    EmptyDisplayName,
    /// The endpoint identifier was empty after trimming.
    EmptyEndpointId,
    /// A networked operation was requested but no transport is configured.
    NetworkUnavailable,
    /// A numeric configuration value is outside its allowed range.
    ConfigValueOutOfRange {
        /// The offending field.
        field: &'static str,
        /// Smallest allowed value.
        min: u64,
        /// Largest allowed value.
        max: u64,
        /// The value that was supplied.
        actual: u64,
    },
    /// A duration configuration value is outside its allowed range.
    DurationConfigOutOfRange {
        /// The offending field.
        field: &'static str,
        /// Smallest allowed value in milliseconds.
        min_ms: u64,
        /// Largest allowed value in milliseconds.
        max_ms: u64,
        /// The value that was supplied, in milliseconds.
        actual_ms: u64,
    },
}

impl Display for InvalidRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRequestKind::EmptyDisplayName => write!(f, "display name must not be empty"),
            InvalidRequestKind::EmptyEndpointId => write!(f, "room id must not be empty"),
            InvalidRequestKind::NetworkUnavailable => {
                write!(f, "networked play requires a transport")
            }
            InvalidRequestKind::ConfigValueOutOfRange {
                field,
                min,
                max,
                actual,
            } => write!(
                f,
                "{} must be between {} and {}, got {}",
                field, min, max, actual
            ),
            InvalidRequestKind::DurationConfigOutOfRange {
                field,
                min_ms,
                max_ms,
                actual_ms,
            } => write!(
                f,
                "{} must be between {}ms and {}ms, got {}ms",
                field, min_ms, max_ms, actual_ms
            ),
        }
    }
}

impl Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::InvalidRequest { kind } => {
                write!(f, "Invalid Request: {}", kind)
            }
            ArenaError::WrongPhase { operation, phase } => {
                write!(f, "Cannot {} while the match is in {:?}", operation, phase)
            }
            ArenaError::ActionAlreadyCommitted { round } => {
                write!(f, "An action was already committed for round {}", round)
            }
            ArenaError::ChannelNotOpen => {
                write!(f, "No channel is open to send on.")
            }
            ArenaError::PeerUnavailable { endpoint } => {
                write!(f, "No peer is listening on {}", endpoint)
            }
            ArenaError::SocketError { context } => {
                write!(f, "Socket error: {}", context)
            }
            ArenaError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            }
            ArenaError::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            }
        }
    }
}

impl Error for ArenaError {}

impl From<InvalidRequestKind> for ArenaError {
    fn from(kind: InvalidRequestKind) -> Self {
        ArenaError::InvalidRequest { kind }
    }
}

impl From<CodecError> for ArenaError {
    fn from(err: CodecError) -> Self {
        ArenaError::SerializationError {
            context: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ArenaError {
    fn from(err: std::io::Error) -> Self {
        ArenaError::SocketError {
            context: err.to_string(),
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
    use crate::Side;

    #[test]
    fn invalid_request_display_includes_reason() {
        let err: ArenaError = InvalidRequestKind::EmptyDisplayName.into();
        assert_eq!(
            err.to_string(),
            "Invalid Request: display name must not be empty"
        );
    }

    #[test]
    fn out_of_range_display_lists_bounds() {
        let err: ArenaError = InvalidRequestKind::ConfigValueOutOfRange {
            field: "max_event_queue_size",
            min: 1,
            max: 4096,
            actual: 0,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("max_event_queue_size"));
        assert!(msg.contains("4096"));
        assert!(msg.ends_with("got 0"));
    }

    #[test]
    fn wrong_phase_names_operation_and_phase() {
        let err = ArenaError::WrongPhase {
            operation: "commit an action",
            phase: MatchPhase::ActiveRound { turn: Side::A },
        };
        let msg = err.to_string();
        assert!(msg.contains("commit an action"));
        assert!(msg.contains("ActiveRound"));
    }

    #[test]
    fn codec_errors_become_serialization_errors() {
        let codec = CodecError::Decode("bad tag".to_owned());
        let err: ArenaError = codec.into();
        assert!(matches!(err, ArenaError::SerializationError { .. }));
    }

    #[test]
    fn io_errors_become_socket_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ArenaError = io.into();
        assert_eq!(err.to_string(), "Socket error: refused");
    }
}
