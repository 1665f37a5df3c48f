//! Session protocol state machine.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌──────────────┐  on_channel_open()  ┌───────────────────┐  peer Handshake  ┌─────────────┐
//! │ AwaitingOpen │ ───────────────────►│ AwaitingHandshake │ ────────────────►│ Established │
//! └──────┬───────┘                     └─────────┬─────────┘                  └──────┬──────┘
//!        │                                       │                                   │
//!        │               close() / channel closed or errored                         │
//!        └───────────────────────────────────────┼───────────────────────────────────┘
//!                                                ▼
//!                                           ┌────────┐
//!                                           │ Closed │
//!                                           └────────┘
//! ```
//!
//! ## State Transitions
//!
//! | From              | To                | Trigger                           |
//! |-------------------|-------------------|-----------------------------------|
//! | AwaitingOpen      | AwaitingHandshake | channel opened, handshake queued  |
//! | AwaitingHandshake | Established       | first peer `Handshake` received   |
//! | any               | Closed            | `close()`                         |

/// Internal state of a [`SessionProtocol`](super::SessionProtocol).
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// No channel yet. Nothing is sent; anything received is dropped.
    AwaitingOpen,
    /// Our handshake is queued or sent; only the peer's handshake is accepted.
    AwaitingHandshake,
    /// Both sides know each other. Round messages flow.
    Established,
    /// Terminal. All traffic is dropped.
    Closed,
}

impl ProtocolState {
    /// Returns `true` if `ActionReveal` and `RematchReady` may be sent or accepted.
    #[must_use]
    pub const fn carries_round_messages(self) -> bool {
        matches!(self, ProtocolState::Established)
    }

    /// Returns `true` once the channel opened and before it closed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            ProtocolState::AwaitingHandshake | ProtocolState::Established
        )
    }
}
