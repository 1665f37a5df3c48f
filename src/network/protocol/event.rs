use crate::Action;

/// Something the peer told us that the match state machine has to act on.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The peer introduced itself. `first` is `false` for a repeated handshake, which
    /// only refreshes the name.
    HandshakeReceived {
        /// The peer's display name.
        display_name: String,
        /// Whether this handshake completed the connection.
        first: bool,
    },
    /// The peer revealed its action for the current round.
    RemoteAction {
        /// The revealed action.
        action: Action,
    },
    /// The peer asked for the next round.
    RemoteReady,
}
