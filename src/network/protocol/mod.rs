//! Session protocol for one networked pairing.
//!
//! The protocol sits between a [`Channel`](crate::Channel) and the match state machine. It
//! produces the outgoing [`Message`]s for local decisions and turns incoming messages into
//! [`ProtocolEvent`]s after filtering out everything that is out of place: wrong version,
//! round traffic before the handshake, stale or future rounds and duplicates.

mod event;
mod state;

pub use event::ProtocolEvent;
pub use state::ProtocolState;

use crate::error::{ArenaError, ArenaResult};
use crate::network::messages::{Message, MessageBody, PROTOCOL_VERSION};
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{Action, RoundId};
use tracing::{debug, trace};

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;
use std::sync::Arc;

/// Per-pairing message rules.
///
/// Every round-scoped message carries the round it belongs to. Each side advances its round
/// only after both rematch signals for the previous round were exchanged, and the channel is
/// FIFO, so a well-behaved peer never sends a message for a round we have not reached yet.
pub struct SessionProtocol {
    state: ProtocolState,
    local_name: String,
    remote_name: Option<String>,
    round: RoundId,

    local_revealed: bool,
    remote_revealed: bool,
    local_ready: bool,
    remote_ready: bool,

    send_queue: VecDeque<Message>,
    event_queue: VecDeque<ProtocolEvent>,

    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for SessionProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProtocol")
            .field("state", &self.state)
            .field("local_name", &self.local_name)
            .field("remote_name", &self.remote_name)
            .field("round", &self.round)
            .field("local_revealed", &self.local_revealed)
            .field("remote_revealed", &self.remote_revealed)
            .field("local_ready", &self.local_ready)
            .field("remote_ready", &self.remote_ready)
            .field("queued_messages", &self.send_queue.len())
            .field("queued_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}

impl SessionProtocol {
    /// Creates a protocol waiting for its channel.
    #[must_use]
    pub fn new(
        local_name: impl Into<String>,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            state: ProtocolState::AwaitingOpen,
            local_name: local_name.into(),
            remote_name: None,
            round: RoundId::ZERO,
            local_revealed: false,
            remote_revealed: false,
            local_ready: false,
            remote_ready: false,
            send_queue: VecDeque::new(),
            event_queue: VecDeque::new(),
            observer,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProtocolState {
        self.state
    }

    /// The round the protocol accepts messages for.
    #[must_use]
    pub const fn round(&self) -> RoundId {
        self.round
    }

    /// The name we announce in our handshake.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The peer's latest announced name.
    #[must_use]
    pub fn remote_name(&self) -> Option<&str> {
        self.remote_name.as_deref()
    }

    /// Whether we already revealed our action this round.
    #[must_use]
    pub const fn has_revealed(&self) -> bool {
        self.local_revealed
    }

    /// Whether the peer already revealed its action this round.
    #[must_use]
    pub const fn peer_has_revealed(&self) -> bool {
        self.remote_revealed
    }

    /// The channel opened. Queues our handshake.
    pub fn on_channel_open(&mut self) {
        if self.state != ProtocolState::AwaitingOpen {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::SessionProtocol,
                "channel opened again in state {:?}",
                self.state
            );
            return;
        }
        self.state = ProtocolState::AwaitingHandshake;
        let name = self.local_name.clone();
        self.queue_message(Message::handshake(name));
    }

    /// Queues the reveal of our action for the current round.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::ChannelNotOpen`] before the handshake completed or after close.
    /// - [`ArenaError::ActionAlreadyCommitted`] if we already revealed this round.
    pub fn send_reveal(&mut self, action: Action) -> ArenaResult<()> {
        if !self.state.carries_round_messages() {
            return Err(ArenaError::ChannelNotOpen);
        }
        if self.local_revealed {
            return Err(ArenaError::ActionAlreadyCommitted { round: self.round });
        }
        self.local_revealed = true;
        self.queue_message(Message::action_reveal(self.round, action));
        Ok(())
    }

    /// Queues our rematch signal for the current round. Repeated calls send nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ChannelNotOpen`] before the handshake completed or after close.
    pub fn send_rematch_ready(&mut self) -> ArenaResult<()> {
        if !self.state.carries_round_messages() {
            return Err(ArenaError::ChannelNotOpen);
        }
        if self.local_ready {
            return Ok(());
        }
        self.local_ready = true;
        self.queue_message(Message::rematch_ready(self.round));
        Ok(())
    }

    /// Moves to the next round and forgets everything about the previous one.
    pub fn advance_round(&mut self) {
        self.round = self.round.next();
        self.local_revealed = false;
        self.remote_revealed = false;
        self.local_ready = false;
        self.remote_ready = false;
        debug!("session protocol advanced to round {}", self.round);
    }

    /// Stops all traffic. Pending outgoing messages are dropped.
    pub fn close(&mut self) {
        self.state = ProtocolState::Closed;
        self.send_queue.clear();
    }

    /// Messages waiting to be written to the channel, in order.
    pub fn drain_send_queue(&mut self) -> Drain<'_, Message> {
        self.send_queue.drain(..)
    }

    /// Returns all events produced since last queried.
    #[must_use]
    pub fn events(&mut self) -> Drain<'_, ProtocolEvent> {
        self.event_queue.drain(..)
    }

    fn queue_message(&mut self, msg: Message) {
        trace!("queuing {} for round {}", msg.body.kind(), self.round);
        self.send_queue.push_back(msg);
    }

    /*
     *  RECEIVING MESSAGES
     */

    /// Applies one message from the peer.
    pub fn handle_message(&mut self, msg: &Message) {
        trace!("handling {:?}", msg);

        if matches!(
            self.state,
            ProtocolState::AwaitingOpen | ProtocolState::Closed
        ) {
            trace!("protocol not open; ignoring message");
            return;
        }

        if msg.header.version != PROTOCOL_VERSION {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::SessionProtocol,
                "dropping {} with protocol version {} (expected {})",
                msg.body.kind(),
                msg.header.version,
                PROTOCOL_VERSION
            );
            return;
        }

        match &msg.body {
            MessageBody::Handshake { display_name } => self.on_handshake(display_name),
            MessageBody::ActionReveal { round, action } => self.on_action_reveal(*round, *action),
            MessageBody::RematchReady { round } => self.on_rematch_ready(*round),
        }
    }

    fn on_handshake(&mut self, display_name: &str) {
        let first = self.state == ProtocolState::AwaitingHandshake;
        if first {
            self.state = ProtocolState::Established;
            debug!("handshake with {display_name:?} completed");
        } else {
            debug!("repeated handshake from {display_name:?}");
        }
        self.remote_name = Some(display_name.to_owned());
        self.event_queue.push_back(ProtocolEvent::HandshakeReceived {
            display_name: display_name.to_owned(),
            first,
        });
    }

    fn on_action_reveal(&mut self, round: RoundId, action: Action) {
        if !self.accepts_round_message("action_reveal", round) {
            return;
        }
        if self.remote_revealed {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::SessionProtocol,
                round = round,
                "duplicate action_reveal; keeping the first"
            );
            return;
        }
        self.remote_revealed = true;
        self.event_queue
            .push_back(ProtocolEvent::RemoteAction { action });
    }

    fn on_rematch_ready(&mut self, round: RoundId) {
        if !self.accepts_round_message("rematch_ready", round) {
            return;
        }
        if self.remote_ready {
            trace!("duplicate rematch_ready for round {round}; ignoring");
            return;
        }
        self.remote_ready = true;
        self.event_queue.push_back(ProtocolEvent::RemoteReady);
    }

    fn accepts_round_message(&self, kind: &str, round: RoundId) -> bool {
        if !self.state.carries_round_messages() {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::SessionProtocol,
                round = round,
                "{} before handshake; dropping",
                kind
            );
            return false;
        }
        if round != self.round {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::SessionProtocol,
                round = round,
                "{} for round {} while in round {}; dropping",
                kind,
                round,
                self.round
            );
            return false;
        }
        true
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
    use crate::network::messages::MessageHeader;
    use crate::telemetry::CollectingObserver;

    fn established() -> (SessionProtocol, Arc<CollectingObserver>) {
        let observer = Arc::new(CollectingObserver::new());
        let mut protocol = SessionProtocol::new("Ada", Some(observer.clone()));
        protocol.on_channel_open();
        protocol.handle_message(&Message::handshake("Grace"));
        protocol.send_queue.clear();
        protocol.event_queue.clear();
        (protocol, observer)
    }

    #[test]
    fn channel_open_queues_handshake() {
        let mut protocol = SessionProtocol::new("Ada", None);
        protocol.on_channel_open();

        assert_eq!(protocol.state(), ProtocolState::AwaitingHandshake);
        let sent: Vec<_> = protocol.drain_send_queue().collect();
        assert_eq!(sent, vec![Message::handshake("Ada")]);
    }

    #[test]
    fn second_channel_open_is_ignored() {
        let observer = Arc::new(CollectingObserver::new());
        let mut protocol = SessionProtocol::new("Ada", Some(observer.clone()));
        protocol.on_channel_open();
        protocol.send_queue.clear();
        protocol.on_channel_open();

        assert!(protocol.send_queue.is_empty());
        assert!(observer.has_violation(ViolationKind::SessionProtocol));
    }

    #[test]
    fn first_handshake_establishes() {
        let mut protocol = SessionProtocol::new("Ada", None);
        protocol.on_channel_open();
        protocol.handle_message(&Message::handshake("Grace"));

        assert_eq!(protocol.state(), ProtocolState::Established);
        assert_eq!(protocol.remote_name(), Some("Grace"));
        let events: Vec<_> = protocol.events().collect();
        assert_eq!(
            events,
            vec![ProtocolEvent::HandshakeReceived {
                display_name: "Grace".to_owned(),
                first: true
            }]
        );
    }

    #[test]
    fn repeated_handshake_only_updates_name() {
        let (mut protocol, observer) = established();
        protocol.handle_message(&Message::handshake("Grace H."));

        assert_eq!(protocol.state(), ProtocolState::Established);
        assert_eq!(protocol.remote_name(), Some("Grace H."));
        let events: Vec<_> = protocol.events().collect();
        assert_eq!(
            events,
            vec![ProtocolEvent::HandshakeReceived {
                display_name: "Grace H.".to_owned(),
                first: false
            }]
        );
        assert!(observer.is_empty());
    }

    #[test]
    fn handle_message_ignores_closed_state() {
        let (mut protocol, _) = established();
        protocol.close();
        protocol.handle_message(&Message::action_reveal(RoundId::ZERO, Action::Rock));

        assert!(protocol.event_queue.is_empty());
    }

    #[test]
    fn handle_message_ignores_unopened_state() {
        let mut protocol = SessionProtocol::new("Ada", None);
        protocol.handle_message(&Message::handshake("Grace"));

        assert_eq!(protocol.state(), ProtocolState::AwaitingOpen);
        assert!(protocol.event_queue.is_empty());
    }

    #[test]
    fn wrong_version_is_dropped() {
        let (mut protocol, observer) = established();
        let msg = Message {
            header: MessageHeader {
                version: PROTOCOL_VERSION + 1,
            },
            body: MessageBody::ActionReveal {
                round: RoundId::ZERO,
                action: Action::Paper,
            },
        };
        protocol.handle_message(&msg);

        assert!(protocol.event_queue.is_empty());
        assert!(observer.has_violation(ViolationKind::SessionProtocol));
    }

    #[test]
    fn reveal_before_handshake_is_dropped() {
        let observer = Arc::new(CollectingObserver::new());
        let mut protocol = SessionProtocol::new("Ada", Some(observer.clone()));
        protocol.on_channel_open();
        protocol.handle_message(&Message::action_reveal(RoundId::ZERO, Action::Rock));

        assert!(protocol.event_queue.is_empty());
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn reveal_for_current_round_is_delivered_once() {
        let (mut protocol, observer) = established();
        protocol.handle_message(&Message::action_reveal(RoundId::ZERO, Action::Rock));
        protocol.handle_message(&Message::action_reveal(RoundId::ZERO, Action::Paper));

        let events: Vec<_> = protocol.events().collect();
        assert_eq!(
            events,
            vec![ProtocolEvent::RemoteAction {
                action: Action::Rock
            }]
        );
        assert!(protocol.peer_has_revealed());
        let dropped = observer.violations_of_kind(ViolationKind::SessionProtocol);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].round, Some(RoundId::ZERO));
    }

    #[test]
    fn stale_and_future_reveals_are_dropped() {
        let (mut protocol, observer) = established();
        protocol.advance_round();
        protocol.handle_message(&Message::action_reveal(RoundId::ZERO, Action::Rock));
        protocol.handle_message(&Message::action_reveal(RoundId::new(2), Action::Rock));

        assert!(protocol.event_queue.is_empty());
        assert_eq!(observer.len(), 2);
    }

    #[test]
    fn send_reveal_requires_handshake() {
        let mut protocol = SessionProtocol::new("Ada", None);
        protocol.on_channel_open();
        assert_eq!(
            protocol.send_reveal(Action::Rock),
            Err(ArenaError::ChannelNotOpen)
        );
    }

    #[test]
    fn send_reveal_once_per_round() {
        let (mut protocol, _) = established();
        protocol.send_reveal(Action::Scissors).unwrap();
        assert_eq!(
            protocol.send_reveal(Action::Rock),
            Err(ArenaError::ActionAlreadyCommitted {
                round: RoundId::ZERO
            })
        );
        let sent: Vec<_> = protocol.drain_send_queue().collect();
        assert_eq!(
            sent,
            vec![Message::action_reveal(RoundId::ZERO, Action::Scissors)]
        );

        protocol.advance_round();
        protocol.send_reveal(Action::Rock).unwrap();
        let sent: Vec<_> = protocol.drain_send_queue().collect();
        assert_eq!(
            sent,
            vec![Message::action_reveal(RoundId::new(1), Action::Rock)]
        );
    }

    #[test]
    fn rematch_ready_is_sent_once() {
        let (mut protocol, _) = established();
        protocol.send_rematch_ready().unwrap();
        protocol.send_rematch_ready().unwrap();

        let sent: Vec<_> = protocol.drain_send_queue().collect();
        assert_eq!(sent, vec![Message::rematch_ready(RoundId::ZERO)]);
    }

    #[test]
    fn remote_ready_is_reported_once_per_round() {
        let (mut protocol, _) = established();
        protocol.handle_message(&Message::rematch_ready(RoundId::ZERO));
        protocol.handle_message(&Message::rematch_ready(RoundId::ZERO));

        let events: Vec<_> = protocol.events().collect();
        assert_eq!(events, vec![ProtocolEvent::RemoteReady]);
    }

    #[test]
    fn stale_rematch_ready_is_dropped() {
        let (mut protocol, observer) = established();
        protocol.advance_round();
        protocol.handle_message(&Message::rematch_ready(RoundId::ZERO));

        assert!(protocol.event_queue.is_empty());
        assert!(observer.has_violation(ViolationKind::SessionProtocol));
    }

    #[test]
    fn close_drops_pending_messages() {
        let (mut protocol, _) = established();
        protocol.send_reveal(Action::Rock).unwrap();
        protocol.close();

        assert_eq!(protocol.state(), ProtocolState::Closed);
        assert_eq!(protocol.drain_send_queue().count(), 0);
        assert_eq!(
            protocol.send_rematch_ready(),
            Err(ArenaError::ChannelNotOpen)
        );
    }
}
