//! # RPS Arena
//!
//! A rock-paper-scissors match engine for one client. It drives round progression through a
//! single owned [`MatchContext`] and keeps two independently running clients consistent over a
//! reliable, ordered message channel without any server authority.
//!
//! Like the rest of the poll-driven networking crates it grew up next to, the engine never calls
//! back into the application. The host calls [`MatchContext::poll`] from its own loop, drains
//! [`MatchContext::events`] to update its view, and fulfills the [`MatchRequest`]s it takes from
//! [`MatchContext::take_requests`] (commentary lookups) whenever it likes.
//!
//! ```
//! use rps_arena::prelude::*;
//!
//! let mut ctx = MatchBuilder::new()
//!     .with_config(MatchConfig::testing())
//!     .with_opponent(ScriptedOpponent::new(vec![Action::Scissors]))
//!     .build()
//!     .expect("valid config");
//!
//! ctx.submit_display_name("Ada").unwrap();
//! ctx.select_mode(PlayMode::Automated).unwrap();
//! ctx.commit_action(Action::Rock).unwrap();
//!
//! assert_eq!(ctx.phase(), MatchPhase::Result);
//! assert_eq!(ctx.score().side_a, 1);
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::fmt;

use serde::{Deserialize, Serialize};

pub use commentary::{
    fallback_commentary, fulfill, CommentaryError, CommentaryReply, CommentaryRequest,
    CommentaryService, CommentaryTicket, UNAVAILABLE_COMMENTARY,
};
#[cfg(feature = "tokio")]
pub use commentary::{AsyncCommentaryService, CommentaryDriver};
pub use error::{ArenaError, ArenaResult, InvalidRequestKind};
pub use network::endpoint::{ConnectionEndpoint, EndpointEvent};
pub use network::memory_channel::{MemoryChannel, MemoryHub, MemoryTransport};
pub use network::messages::{Message, MessageBody, MessageHeader, PROTOCOL_VERSION};
pub use network::tcp_channel::{TcpChannel, TcpTransport};
pub use resolver::resolve;
pub use round::{ReadyFlags, RoundState, Score};
pub use sessions::builder::{MatchBuilder, MatchConfig};
pub use sessions::event_drain::EventDrain;
pub use sessions::match_context::{MatchContext, MatchSession};
pub use sessions::opponent::{OpponentStrategy, RandomOpponent, ScriptedOpponent};

pub mod commentary;
#[doc(hidden)]
pub mod error;
pub mod prelude;
pub mod resolver;
pub mod round;
pub mod rng;
pub mod telemetry;
#[doc(hidden)]
pub mod sessions {
    #[doc(hidden)]
    pub mod builder;
    #[doc(hidden)]
    pub mod config;
    #[doc(hidden)]
    pub mod event_drain;
    #[doc(hidden)]
    pub mod match_context;
    pub mod opponent;
}
#[doc(hidden)]
pub mod network {
    /// Binary codec for wire messages.
    ///
    /// Encodes and decodes [`Message`](crate::Message) frames with bincode.
    pub mod codec;
    pub mod endpoint;
    pub mod memory_channel;
    #[doc(hidden)]
    pub mod messages;
    #[doc(hidden)]
    pub mod protocol;
    pub mod tcp_channel;
}

/// Internal module exposing implementation details for testing and fuzzing.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here may change without notice
/// and is intended only for fuzz targets, property tests and integration tests in this
/// repository.
#[doc(hidden)]
pub mod __internal {
    pub use crate::network::protocol::{ProtocolEvent, ProtocolState, SessionProtocol};
}

// #############
// # CORE TYPES #
// #############

/// One of the three mutually-beating choices a player commits per round.
///
/// `Rock` beats `Scissors`, `Scissors` beats `Paper`, `Paper` beats `Rock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// The first action.
    Rock,
    /// The second action.
    Paper,
    /// The third action.
    Scissors,
}

impl Action {
    /// All actions in index order.
    pub const ALL: [Action; 3] = [Action::Rock, Action::Paper, Action::Scissors];

    /// Returns the action at `index` (0, 1 or 2).
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Action> {
        match index {
            0 => Some(Action::Rock),
            1 => Some(Action::Paper),
            2 => Some(Action::Scissors),
            _ => None,
        }
    }

    /// Returns `true` if `self` beats `other` under the fixed cyclic relation.
    ///
    /// ```
    /// use rps_arena::Action;
    ///
    /// assert!(Action::Rock.beats(Action::Scissors));
    /// assert!(!Action::Rock.beats(Action::Rock));
    /// ```
    #[inline]
    #[must_use]
    pub const fn beats(self, other: Action) -> bool {
        matches!(
            (self, other),
            (Action::Rock, Action::Scissors)
                | (Action::Scissors, Action::Paper)
                | (Action::Paper, Action::Rock)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Rock => "ROCK",
            Action::Paper => "PAPER",
            Action::Scissors => "SCISSORS",
        })
    }
}

/// The two sides of a match. `A` is always the local participant (player 1 in hotseat mode).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The local participant.
    A,
    /// The opponent: automated, second hotseat player, or remote peer.
    B,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Result of comparing two actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The first argument of [`resolve`] won.
    SideAWins,
    /// The second argument of [`resolve`] won.
    SideBWins,
    /// Both sides chose the same action.
    Draw,
}

impl Outcome {
    /// The winning side, or `None` for a draw.
    #[must_use]
    pub const fn winner(self) -> Option<Side> {
        match self {
            Outcome::SideAWins => Some(Side::A),
            Outcome::SideBWins => Some(Side::B),
            Outcome::Draw => None,
        }
    }

    /// The same result seen with the sides swapped.
    #[must_use]
    pub const fn swapped(self) -> Outcome {
        match self {
            Outcome::SideAWins => Outcome::SideBWins,
            Outcome::SideBWins => Outcome::SideAWins,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// How the opponent's action is supplied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayMode {
    /// Human versus the automated opponent.
    Automated,
    /// Two humans sharing one device.
    Hotseat,
    /// Two clients connected over a channel.
    Networked,
}

impl PlayMode {
    /// Stable tag passed to the commentary service.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            PlayMode::Automated => "VS_CPU",
            PlayMode::Hotseat => "VS_FRIEND",
            PlayMode::Networked => "ONLINE",
        }
    }
}

/// Which side of a networked pairing opened the channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionRole {
    /// Dialed the remote endpoint.
    Initiator,
    /// Listened and accepted the remote's dial.
    Acceptor,
}

/// Every phase a [`MatchContext`] can be in.
///
/// ```text
/// Setup → Menu → { Lobby | ActiveRound } → [Transition] → ActiveRound → Result
///                                                    ↑                    │
///                                                    └──── rematch ───────┘
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    /// Collecting the local display name.
    Setup,
    /// Choosing a play mode.
    Menu,
    /// Networked mode only: hosting, joining, or waiting for the peer's handshake.
    Lobby,
    /// Actions are being committed. `turn` is `Side::B` only for the second hotseat player.
    ActiveRound {
        /// Whose action the round is waiting on locally.
        turn: Side,
    },
    /// Hotseat only: the device is being passed to the second player.
    Transition,
    /// Both actions are in and the round is resolved.
    Result,
}

impl MatchPhase {
    /// Returns `true` for any [`MatchPhase::ActiveRound`].
    #[must_use]
    pub const fn is_active_round(self) -> bool {
        matches!(self, MatchPhase::ActiveRound { .. })
    }
}

/// Monotonically increasing round counter, starting at zero for each match.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RoundId(u32);

impl RoundId {
    /// The first round of a match.
    pub const ZERO: RoundId = RoundId(0);

    /// Creates a round id from a raw counter.
    #[inline]
    #[must_use]
    pub const fn new(round: u32) -> Self {
        RoundId(round)
    }

    /// Returns the raw counter.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The round after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> RoundId {
        RoundId(self.0.saturating_add(1))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a listening endpoint (the "room id" shared with the other player).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    /// Wraps `id` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        EndpointId(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        EndpointId::new(id)
    }
}

/// Notifications that you can receive from a [`MatchContext`]. Handling them is up to the user.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`. Always include a wildcard arm when matching.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MatchEvent {
    /// The match moved from one phase to another.
    PhaseChanged {
        /// Phase before the transition.
        from: MatchPhase,
        /// Phase after the transition.
        to: MatchPhase,
    },
    /// The endpoint is listening and can be dialed at `endpoint`.
    ListeningOn {
        /// Identifier to share with the other player.
        endpoint: EndpointId,
    },
    /// A channel to the peer opened.
    ConnectionOpened {
        /// How this side got the channel.
        role: ConnectionRole,
    },
    /// The peer's first handshake arrived.
    HandshakeCompleted {
        /// The peer's display name.
        remote_name: String,
    },
    /// The peer committed an action for the current round. The action itself stays hidden.
    OpponentCommitted,
    /// Both actions are in and the round is resolved.
    RoundResolved {
        /// The round that was resolved.
        round: RoundId,
        /// Side A's action.
        local_action: Action,
        /// Side B's action.
        remote_action: Action,
        /// Who won, from side A's point of view.
        outcome: Outcome,
        /// Score after this round.
        score: Score,
    },
    /// Commentary for the displayed result arrived (or fell back).
    CommentaryUpdated {
        /// The round the commentary describes.
        round: RoundId,
        /// The text to display.
        text: String,
    },
    /// The peer asked for the next round.
    OpponentReady,
    /// The channel is gone; the match will return to the menu.
    Disconnected {
        /// User-visible reason.
        reason: String,
    },
    /// A user-visible, non-fatal error.
    Error {
        /// User-visible message.
        message: String,
    },
}

/// Work the host application performs outside the state machine. Fulfilling it is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MatchRequest {
    /// Ask a commentary service about a resolved round, then hand the result to
    /// [`MatchContext::apply_commentary`].
    Commentary(CommentaryRequest),
}

/// Something a [`Channel`] observed since it was last drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A message from the peer, in send order.
    Message(Message),
    /// The peer closed the channel. Reported once.
    Closed,
    /// The channel failed and is no longer usable.
    Errored(String),
}

// #############
// #  TRAITS   #
// #############

/// An established, reliable, point-to-point FIFO message pipe to one peer.
///
/// Messages arrive exactly once and in send order. There is no acknowledgment layer.
pub trait Channel {
    /// Queues `msg` for delivery to the peer.
    fn send(&mut self, msg: &Message) -> ArenaResult<()>;

    /// Returns everything observed since the last call, in arrival order.
    fn receive_all(&mut self) -> Vec<ChannelEvent>;

    /// Closes the channel. Safe to call more than once.
    fn close(&mut self);

    /// Returns `false` once either side closed the channel or it failed.
    fn is_open(&self) -> bool;
}

/// Establishes [`Channel`]s. Implement this to plug in your own signaling or socket layer.
pub trait Transport {
    /// Starts listening and returns the identifier peers should dial.
    ///
    /// `preferred` asks for a specific identifier; transports may ignore it.
    fn listen(&mut self, preferred: Option<&EndpointId>) -> ArenaResult<EndpointId>;

    /// Opens a channel to the endpoint listening at `remote`.
    ///
    /// This is the only transport call allowed to block. Keep it short: the match that
    /// asked for it waits on the calling thread.
    fn dial(&mut self, remote: &EndpointId) -> ArenaResult<Box<dyn Channel>>;

    /// Returns a channel a peer opened to us, if any. Never blocks.
    fn accept(&mut self) -> Option<Box<dyn Channel>>;

    /// Stops listening. Channels already handed out stay open.
    fn stop_listening(&mut self);
}

// ###################
// # UNIT TESTS      #
// ###################

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
    fn beats_relation_is_cyclic() {
        assert!(Action::Rock.beats(Action::Scissors));
        assert!(Action::Scissors.beats(Action::Paper));
        assert!(Action::Paper.beats(Action::Rock));
        for a in Action::ALL {
            assert!(!a.beats(a));
        }
    }

    #[test]
    fn from_index_covers_all_actions() {
        for (i, action) in Action::ALL.iter().enumerate() {
            assert_eq!(Action::from_index(i), Some(*action));
        }
        assert_eq!(Action::from_index(3), None);
    }

    #[test]
    fn action_display_is_upper_case() {
        assert_eq!(Action::Paper.to_string(), "PAPER");
    }

    #[test]
    fn outcome_swapped_and_winner() {
        assert_eq!(Outcome::SideAWins.swapped(), Outcome::SideBWins);
        assert_eq!(Outcome::Draw.swapped(), Outcome::Draw);
        assert_eq!(Outcome::SideBWins.winner(), Some(Side::B));
        assert_eq!(Outcome::Draw.winner(), None);
    }

    #[test]
    fn round_id_next_saturates() {
        assert_eq!(RoundId::ZERO.next(), RoundId::new(1));
        assert_eq!(RoundId::new(u32::MAX).next(), RoundId::new(u32::MAX));
    }

    #[test]
    fn play_mode_tags() {
        assert_eq!(PlayMode::Automated.tag(), "VS_CPU");
        assert_eq!(PlayMode::Hotseat.tag(), "VS_FRIEND");
        assert_eq!(PlayMode::Networked.tag(), "ONLINE");
    }

    #[test]
    fn endpoint_id_display_round_trips_text() {
        let id = EndpointId::from("room-0007");
        assert_eq!(id.to_string(), "room-0007");
        assert_eq!(id.as_str(), "room-0007");
    }
}
