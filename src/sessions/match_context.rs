//! The per-client match state machine.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};
use web_time::Instant;

use crate::commentary::{CommentaryReply, CommentaryRequest, CommentaryTicket};
use crate::error::{ArenaError, ArenaResult, InvalidRequestKind};
use crate::network::endpoint::{ConnectionEndpoint, EndpointEvent};
use crate::network::protocol::{ProtocolEvent, SessionProtocol};
use crate::report_violation_to;
use crate::round::{ReadyFlags, RoundState, Score};
use crate::sessions::config::MatchConfig;
use crate::sessions::event_drain::EventDrain;
use crate::sessions::opponent::OpponentStrategy;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{
    Action, ConnectionRole, EndpointId, MatchEvent, MatchPhase, MatchRequest, Outcome, PlayMode,
    RoundId, Side, Transport,
};

/// Shown when hosting or dialing fails.
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Connection failed. Please check the Room ID and try again.";
/// Shown when the peer closes the channel.
pub const OPPONENT_DISCONNECTED_MESSAGE: &str = "Opponent disconnected";
/// Shown when the channel fails.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost.";

/// One networked pairing: who is on each end and the protocol between them.
///
/// Created when networked mode is selected. Destroyed when the channel goes away or the
/// match is reset.
#[derive(Debug)]
pub struct MatchSession {
    local_name: String,
    remote_name: String,
    role: Option<ConnectionRole>,
    endpoint_id: Option<EndpointId>,
    protocol: SessionProtocol,
}

impl MatchSession {
    fn new(
        local_name: &str,
        placeholder: &str,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            local_name: local_name.to_owned(),
            remote_name: placeholder.to_owned(),
            role: None,
            endpoint_id: None,
            protocol: SessionProtocol::new(local_name, observer),
        }
    }

    /// Our display name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The peer's display name, or the placeholder before the handshake.
    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Hosting or joining, once chosen.
    #[must_use]
    pub fn role(&self) -> Option<ConnectionRole> {
        self.role
    }

    /// The room we host or the room we dialed.
    #[must_use]
    pub fn endpoint_id(&self) -> Option<&EndpointId> {
        self.endpoint_id.as_ref()
    }

    /// The message rules for this pairing.
    #[must_use]
    pub fn protocol(&self) -> &SessionProtocol {
        &self.protocol
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommentarySlot {
    Empty,
    Pending {
        ticket: CommentaryTicket,
        fallback: String,
    },
    Ready(String),
}

/// All state of one client, driven by user operations and [`poll`](Self::poll).
///
/// Every operation validates against the current [`MatchPhase`] and leaves the context
/// untouched when it returns an error. Whenever an action lands, from a local commit, the
/// automated opponent or the network, the same resolution step runs, so the round resolves
/// exactly once no matter which arrival completed it.
pub struct MatchContext {
    config: MatchConfig,
    phase: MatchPhase,
    mode: Option<PlayMode>,
    local_name: String,
    opponent_name: String,

    score: Score,
    round: RoundId,
    round_state: RoundState,
    ready: ReadyFlags,

    transport: Option<Box<dyn Transport>>,
    endpoint: Option<ConnectionEndpoint>,
    session: Option<MatchSession>,
    opponent: Box<dyn OpponentStrategy>,

    commentary: CommentarySlot,
    last_error: Option<String>,
    return_to_menu_at: Option<Instant>,
    match_epoch: u64,

    event_queue: VecDeque<MatchEvent>,
    request_queue: Vec<MatchRequest>,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for MatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchContext")
            .field("phase", &self.phase)
            .field("mode", &self.mode)
            .field("local_name", &self.local_name)
            .field("opponent_name", &self.opponent_name)
            .field("score", &self.score)
            .field("round", &self.round)
            .field("round_state", &self.round_state)
            .field("ready", &self.ready)
            .field("session", &self.session)
            .field("endpoint", &self.endpoint)
            .field("last_error", &self.last_error)
            .field("match_epoch", &self.match_epoch)
            .finish_non_exhaustive()
    }
}

impl MatchContext {
    pub(crate) fn new(
        config: MatchConfig,
        transport: Option<Box<dyn Transport>>,
        opponent: Box<dyn OpponentStrategy>,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let opponent_name = config.placeholder_opponent_name.clone();
        Self {
            config,
            phase: MatchPhase::Setup,
            mode: None,
            local_name: String::new(),
            opponent_name,
            score: Score::default(),
            round: RoundId::ZERO,
            round_state: RoundState::new(),
            ready: ReadyFlags::default(),
            transport,
            endpoint: None,
            session: None,
            opponent,
            commentary: CommentarySlot::Empty,
            last_error: None,
            return_to_menu_at: None,
            match_epoch: 0,
            event_queue: VecDeque::new(),
            request_queue: Vec::new(),
            observer,
        }
    }

    /*
     *  USER OPERATIONS
     */

    /// Sets the local display name and moves from `Setup` to `Menu`.
    ///
    /// The name is trimmed. The connection endpoint is created here, idle.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `Setup`.
    /// - [`InvalidRequestKind::EmptyDisplayName`] if the trimmed name is empty.
    pub fn submit_display_name(&mut self, name: &str) -> ArenaResult<()> {
        self.expect_phase("submit_display_name", MatchPhase::Setup)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(InvalidRequestKind::EmptyDisplayName.into());
        }
        self.local_name = name.to_owned();
        if self.endpoint.is_none() {
            if let Some(transport) = self.transport.take() {
                self.endpoint = Some(ConnectionEndpoint::new(transport, self.observer.clone()));
            }
        }
        self.set_phase(MatchPhase::Menu);
        Ok(())
    }

    /// Chooses how to play. Local modes start the first round; networked mode enters the lobby.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `Menu`.
    /// - [`InvalidRequestKind::NetworkUnavailable`] for networked mode without a transport.
    pub fn select_mode(&mut self, mode: PlayMode) -> ArenaResult<()> {
        self.expect_phase("select_mode", MatchPhase::Menu)?;
        match mode {
            PlayMode::Automated => {
                self.opponent_name = self.config.automated_opponent_name.clone();
                self.start_match(mode);
            },
            PlayMode::Hotseat => {
                self.opponent_name = self.config.placeholder_opponent_name.clone();
                self.start_match(mode);
            },
            PlayMode::Networked => {
                if self.endpoint.is_none() {
                    return Err(InvalidRequestKind::NetworkUnavailable.into());
                }
                self.mode = Some(mode);
                self.opponent_name = self.config.placeholder_opponent_name.clone();
                self.session = Some(MatchSession::new(
                    &self.local_name,
                    &self.config.placeholder_opponent_name,
                    self.observer.clone(),
                ));
                self.last_error = None;
                self.set_phase(MatchPhase::Lobby);
            },
        }
        Ok(())
    }

    /// Becomes the acceptor: starts listening and returns the room id to share.
    ///
    /// Calling it again while hosting returns the same id.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `Lobby` or after joining.
    /// - The transport's error if listening fails. The user-visible error is set as well.
    pub fn host_match(&mut self) -> ArenaResult<EndpointId> {
        let role = self.lobby_session("host_match")?.role;
        match role {
            Some(ConnectionRole::Acceptor) => {
                if let Some(id) = self.session.as_ref().and_then(|s| s.endpoint_id.clone()) {
                    return Ok(id);
                }
            },
            Some(ConnectionRole::Initiator) => return Err(self.wrong_phase("host_match")),
            None => {},
        }

        self.last_error = None;
        let preferred = self.config.preferred_endpoint_id.clone();
        let opened = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.open(preferred.as_ref()),
            None => Err(InvalidRequestKind::NetworkUnavailable.into()),
        };
        match opened {
            Ok(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.role = Some(ConnectionRole::Acceptor);
                    session.endpoint_id = Some(id.clone());
                }
                info!("hosting match as {id}");
                self.push_event(MatchEvent::ListeningOn {
                    endpoint: id.clone(),
                });
                Ok(id)
            },
            Err(e) => {
                debug!("hosting failed: {e}");
                self.connection_failed();
                Err(e)
            },
        }
    }

    /// Stops hosting and goes back to choosing a role. Stays in `Lobby`.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::WrongPhase`] unless hosting in `Lobby`.
    pub fn cancel_hosting(&mut self) -> ArenaResult<()> {
        let role = self.lobby_session("cancel_hosting")?.role;
        if role != Some(ConnectionRole::Acceptor) {
            return Err(self.wrong_phase("cancel_hosting"));
        }
        self.return_to_role_selection();
        Ok(())
    }

    /// Becomes the initiator and dials `remote` (trimmed). Stops hosting first if needed.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `Lobby` or when already joined.
    /// - [`InvalidRequestKind::EmptyEndpointId`] if the trimmed id is empty.
    /// - The transport's error if the remote cannot be reached. The user-visible error is
    ///   set as well.
    ///
    /// # Blocking
    ///
    /// Dialing happens on the calling thread. Over [`TcpTransport`](crate::TcpTransport)
    /// this call can take up to its connect timeout (two seconds by default) when the
    /// remote host does not answer. Everything else in the match is non-blocking.
    pub fn join_match(&mut self, remote: &str) -> ArenaResult<()> {
        let role = self.lobby_session("join_match")?.role;
        let remote = remote.trim();
        if remote.is_empty() {
            return Err(InvalidRequestKind::EmptyEndpointId.into());
        }
        match role {
            Some(ConnectionRole::Initiator) => return Err(self.wrong_phase("join_match")),
            Some(ConnectionRole::Acceptor) => self.return_to_role_selection(),
            None => {},
        }

        self.last_error = None;
        let remote = EndpointId::new(remote);
        let dialed = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.dial(&remote),
            None => Err(InvalidRequestKind::NetworkUnavailable.into()),
        };
        match dialed {
            Ok(()) => {
                info!("joining match {remote}");
                if let Some(session) = self.session.as_mut() {
                    session.role = Some(ConnectionRole::Initiator);
                    session.endpoint_id = Some(remote);
                }
                Ok(())
            },
            Err(e) => {
                debug!("joining {remote} failed: {e}");
                self.connection_failed();
                Err(e)
            },
        }
    }

    /// Leaves the lobby for the menu, closing anything that was opened.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::WrongPhase`] outside `Lobby`.
    pub fn leave_lobby(&mut self) -> ArenaResult<()> {
        self.expect_phase("leave_lobby", MatchPhase::Lobby)?;
        self.teardown_connection();
        self.mode = None;
        self.opponent_name = self.config.placeholder_opponent_name.clone();
        self.last_error = None;
        self.return_to_menu_at = None;
        self.set_phase(MatchPhase::Menu);
        Ok(())
    }

    /// Commits `action` for whoever's turn it is.
    ///
    /// - Automated: the opponent answers at once and the round resolves.
    /// - Hotseat: player 1 moves to `Transition`; player 2 resolves the round.
    /// - Networked: the action is revealed to the peer; the round resolves when the peer's
    ///   reveal is in, which may already be the case.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `ActiveRound`.
    /// - [`ArenaError::ActionAlreadyCommitted`] for a second networked commit in a round.
    /// - [`ArenaError::ChannelNotOpen`] if the peer is gone.
    pub fn commit_action(&mut self, action: Action) -> ArenaResult<()> {
        let MatchPhase::ActiveRound { turn } = self.phase else {
            return Err(self.wrong_phase("commit_action"));
        };
        let round = self.round;
        match self.mode {
            Some(PlayMode::Automated) => {
                self.round_state.set(Side::A, action, round)?;
                let reply = self.opponent.choose_action();
                debug!("automated opponent plays {reply}");
                self.round_state.set(Side::B, reply, round)?;
            },
            Some(PlayMode::Hotseat) => {
                self.round_state.set(turn, action, round)?;
                if turn == Side::A {
                    self.set_phase(MatchPhase::Transition);
                }
            },
            Some(PlayMode::Networked) => {
                if self.round_state.local_action().is_some() {
                    return Err(ArenaError::ActionAlreadyCommitted { round });
                }
                let session = self.session.as_mut().ok_or(ArenaError::ChannelNotOpen)?;
                session.protocol.send_reveal(action)?;
                self.round_state.set(Side::A, action, round)?;
                self.flush_outgoing();
            },
            None => {
                return Err(ArenaError::InternalError {
                    context: "active round without a play mode".to_owned(),
                })
            },
        }
        self.after_mutation();
        Ok(())
    }

    /// Hotseat: the device was handed to player 2.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::WrongPhase`] outside `Transition`.
    pub fn confirm_handoff(&mut self) -> ArenaResult<()> {
        self.expect_phase("confirm_handoff", MatchPhase::Transition)?;
        self.set_phase(MatchPhase::ActiveRound { turn: Side::B });
        Ok(())
    }

    /// Asks for the next round.
    ///
    /// Local modes start it right away. Networked mode signals the peer and starts it once
    /// both sides asked. Asking twice is harmless.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::WrongPhase`] outside `Result`.
    /// - [`ArenaError::ChannelNotOpen`] if the peer is gone.
    pub fn play_again(&mut self) -> ArenaResult<()> {
        self.expect_phase("play_again", MatchPhase::Result)?;
        if self.mode == Some(PlayMode::Networked) {
            if self.ready.local_ready {
                return Ok(());
            }
            let session = self.session.as_mut().ok_or(ArenaError::ChannelNotOpen)?;
            session.protocol.send_rematch_ready()?;
            self.ready.local_ready = true;
            self.flush_outgoing();
            self.after_mutation();
        } else {
            self.begin_next_round();
        }
        Ok(())
    }

    /// Ends the match: closes the channel, clears score, round, flags and session, and returns
    /// to `Menu`. Cancels a pending automatic return.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::WrongPhase`] in `Setup`.
    pub fn reset(&mut self) -> ArenaResult<()> {
        if self.phase == MatchPhase::Setup {
            return Err(self.wrong_phase("reset"));
        }
        self.reset_match();
        Ok(())
    }

    /// Shows commentary for the result on screen.
    ///
    /// Returns `false`, and changes nothing, when the reply belongs to another round, an
    /// earlier match, or a result that is no longer displayed. Failures and blank text show
    /// the fallback.
    pub fn apply_commentary(&mut self, reply: CommentaryReply) -> bool {
        let applies = matches!(
            &self.commentary,
            CommentarySlot::Pending { ticket, .. } if *ticket == reply.ticket
        ) && self.phase == MatchPhase::Result;

        if !applies {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::Commentary,
                round = reply.ticket.round,
                "discarding commentary for epoch {} (current epoch {}, round {}, phase {:?})",
                reply.ticket.match_epoch,
                self.match_epoch,
                self.round,
                self.phase
            );
            return false;
        }

        let text = match &self.commentary {
            CommentarySlot::Pending { fallback, .. } => reply.text_or(fallback),
            CommentarySlot::Empty | CommentarySlot::Ready(_) => return false,
        };
        self.commentary = CommentarySlot::Ready(text.clone());
        self.push_event(MatchEvent::CommentaryUpdated {
            round: reply.ticket.round,
            text,
        });
        true
    }

    /*
     *  POLLING
     */

    /// Processes everything the connection observed and performs a due return to the menu.
    ///
    /// Call this regularly from the host's loop.
    pub fn poll(&mut self) {
        let endpoint_events: Vec<EndpointEvent> = match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.poll().collect(),
            None => Vec::new(),
        };
        for event in endpoint_events {
            self.handle_endpoint_event(event);
        }

        if let Some(deadline) = self.return_to_menu_at {
            if Instant::now() >= deadline {
                info!("returning to menu after disconnect");
                self.reset_match();
            }
        }
    }

    /// Returns all events that happened since last queried. If more than
    /// [`MatchConfig::max_event_queue_size`] piled up, the oldest were discarded.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.event_queue.drain(..))
    }

    /// Takes the work the host should perform outside the state machine.
    #[must_use]
    pub fn take_requests(&mut self) -> Vec<MatchRequest> {
        std::mem::take(&mut self.request_queue)
    }

    fn handle_endpoint_event(&mut self, event: EndpointEvent) {
        match event {
            EndpointEvent::Opened { role } => {
                let Some(session) = self.session.as_mut() else {
                    report_violation_to!(
                        &self.observer,
                        ViolationSeverity::Warning,
                        ViolationKind::MatchState,
                        "channel opened without a networked session"
                    );
                    return;
                };
                session.role = Some(role);
                session.protocol.on_channel_open();
                if role == ConnectionRole::Acceptor {
                    if let Some(endpoint) = self.endpoint.as_mut() {
                        endpoint.stop_listening();
                    }
                }
                info!("channel open as {role:?}");
                self.push_event(MatchEvent::ConnectionOpened { role });
                self.flush_outgoing();
            },
            EndpointEvent::Message(msg) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.protocol.handle_message(&msg);
                self.apply_protocol_events();
                self.after_mutation();
            },
            EndpointEvent::Closed => self.on_channel_lost(OPPONENT_DISCONNECTED_MESSAGE, true),
            EndpointEvent::Errored { context } => {
                debug!("channel error: {context}");
                self.on_channel_lost(CONNECTION_LOST_MESSAGE, false);
            },
        }
    }

    fn apply_protocol_events(&mut self) {
        let events: Vec<ProtocolEvent> = match self.session.as_mut() {
            Some(session) => session.protocol.events().collect(),
            None => return,
        };
        for event in events {
            match event {
                ProtocolEvent::HandshakeReceived {
                    display_name,
                    first,
                } => {
                    if let Some(session) = self.session.as_mut() {
                        session.remote_name.clone_from(&display_name);
                    }
                    self.opponent_name.clone_from(&display_name);
                    if first {
                        info!("handshake completed with {display_name:?}");
                        self.push_event(MatchEvent::HandshakeCompleted {
                            remote_name: display_name,
                        });
                        if self.phase == MatchPhase::Lobby {
                            self.start_match(PlayMode::Networked);
                        }
                    }
                },
                ProtocolEvent::RemoteAction { action } => {
                    match self.round_state.set(Side::B, action, self.round) {
                        Ok(()) => self.push_event(MatchEvent::OpponentCommitted),
                        Err(e) => {
                            report_violation_to!(
                                &self.observer,
                                ViolationSeverity::Warning,
                                ViolationKind::MatchState,
                                round = self.round,
                                "remote action rejected: {}",
                                e
                            );
                        },
                    }
                },
                ProtocolEvent::RemoteReady => {
                    self.ready.remote_ready = true;
                    self.push_event(MatchEvent::OpponentReady);
                },
            }
        }
    }

    fn on_channel_lost(&mut self, message: &str, closed: bool) {
        if self.phase == MatchPhase::Lobby && !closed {
            // A failed attempt only sends the player back to choosing a role.
            self.return_to_role_selection();
            self.set_error(message);
            return;
        }
        if self.session.is_none() {
            return;
        }
        self.teardown_connection();
        self.last_error = Some(message.to_owned());
        self.push_event(MatchEvent::Disconnected {
            reason: message.to_owned(),
        });
        self.push_event(MatchEvent::Error {
            message: message.to_owned(),
        });
        self.return_to_menu_at = Some(Instant::now() + self.config.disconnect_return_delay);
        info!(
            "match dropped ({message}); returning to menu in {:?}",
            self.config.disconnect_return_delay
        );
    }

    /*
     *  TRANSITIONS
     */

    /// The single resolution step run after every mutation that may set an action or a flag.
    fn after_mutation(&mut self) {
        self.try_resolve_round();
        self.try_begin_next_round();
    }

    fn try_resolve_round(&mut self) {
        let Some((local_action, remote_action, outcome)) = self.round_state.resolve_once() else {
            return;
        };
        self.score.record(outcome);
        debug!(
            "round {} resolved: {local_action} vs {remote_action} -> {outcome:?}",
            self.round
        );
        self.set_phase(MatchPhase::Result);
        self.push_event(MatchEvent::RoundResolved {
            round: self.round,
            local_action,
            remote_action,
            outcome,
            score: self.score,
        });
        self.request_commentary(local_action, remote_action, outcome);
    }

    fn try_begin_next_round(&mut self) {
        if self.mode == Some(PlayMode::Networked)
            && self.phase == MatchPhase::Result
            && self.ready.both()
        {
            self.begin_next_round();
        }
    }

    fn request_commentary(&mut self, local_action: Action, remote_action: Action, outcome: Outcome) {
        let Some(mode) = self.mode else {
            return;
        };
        let request = CommentaryRequest {
            ticket: CommentaryTicket {
                match_epoch: self.match_epoch,
                round: self.round,
            },
            local_action,
            remote_action,
            outcome,
            mode,
            local_name: self.local_name.clone(),
            opponent_name: self.opponent_name.clone(),
        };
        self.commentary = CommentarySlot::Pending {
            ticket: request.ticket,
            fallback: request.fallback(),
        };
        self.request_queue.push(MatchRequest::Commentary(request));
    }

    fn start_match(&mut self, mode: PlayMode) {
        self.mode = Some(mode);
        self.round = RoundId::ZERO;
        self.round_state.clear();
        self.ready.clear();
        self.commentary = CommentarySlot::Empty;
        self.set_phase(MatchPhase::ActiveRound { turn: Side::A });
    }

    fn begin_next_round(&mut self) {
        self.round_state.clear();
        self.ready.clear();
        self.round = self.round.next();
        self.commentary = CommentarySlot::Empty;
        if let Some(session) = self.session.as_mut() {
            session.protocol.advance_round();
        }
        self.set_phase(MatchPhase::ActiveRound { turn: Side::A });
    }

    fn reset_match(&mut self) {
        self.teardown_connection();
        self.score.reset();
        self.round_state.clear();
        self.ready.clear();
        self.round = RoundId::ZERO;
        self.mode = None;
        self.opponent_name = self.config.placeholder_opponent_name.clone();
        self.commentary = CommentarySlot::Empty;
        self.last_error = None;
        self.return_to_menu_at = None;
        self.match_epoch = self.match_epoch.wrapping_add(1);
        self.set_phase(MatchPhase::Menu);
    }

    fn teardown_connection(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.protocol.close();
        }
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.close();
        }
    }

    fn return_to_role_selection(&mut self) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.close();
        }
        if let Some(session) = self.session.as_mut() {
            session.role = None;
            session.endpoint_id = None;
            session.protocol = SessionProtocol::new(&self.local_name, self.observer.clone());
        }
    }

    fn connection_failed(&mut self) {
        self.return_to_role_selection();
        self.set_error(CONNECTION_FAILED_MESSAGE);
    }

    fn flush_outgoing(&mut self) {
        let (Some(session), Some(endpoint)) = (self.session.as_mut(), self.endpoint.as_mut())
        else {
            return;
        };
        for msg in session.protocol.drain_send_queue() {
            if let Err(e) = endpoint.send(&msg) {
                // The channel reports the failure itself on the next poll.
                report_violation_to!(
                    &self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Channel,
                    "failed to send {}: {}",
                    msg.body.kind(),
                    e
                );
                break;
            }
        }
    }

    fn set_error(&mut self, message: &str) {
        self.last_error = Some(message.to_owned());
        self.push_event(MatchEvent::Error {
            message: message.to_owned(),
        });
    }

    fn set_phase(&mut self, to: MatchPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        debug!("phase {from:?} -> {to:?}");
        self.phase = to;
        self.push_event(MatchEvent::PhaseChanged { from, to });
    }

    fn push_event(&mut self, event: MatchEvent) {
        self.event_queue.push_back(event);
        while self.event_queue.len() > self.config.max_event_queue_size {
            self.event_queue.pop_front();
        }
    }

    fn expect_phase(&self, operation: &'static str, phase: MatchPhase) -> ArenaResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.wrong_phase(operation))
        }
    }

    fn wrong_phase(&self, operation: &'static str) -> ArenaError {
        ArenaError::WrongPhase {
            operation,
            phase: self.phase,
        }
    }

    fn lobby_session(&self, operation: &'static str) -> ArenaResult<&MatchSession> {
        self.expect_phase(operation, MatchPhase::Lobby)?;
        self.session
            .as_ref()
            .ok_or_else(|| self.wrong_phase(operation))
    }

    /*
     *  ACCESSORS
     */

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Selected play mode, if any.
    #[must_use]
    pub const fn mode(&self) -> Option<PlayMode> {
        self.mode
    }

    /// Rounds won per side in this match.
    #[must_use]
    pub const fn score(&self) -> Score {
        self.score
    }

    /// Current round counter, starting at zero for each match.
    #[must_use]
    pub const fn round(&self) -> RoundId {
        self.round
    }

    /// Round number for display: decided rounds plus one, so draws repeat the number.
    #[must_use]
    pub const fn display_round(&self) -> u32 {
        self.score.total().saturating_add(1)
    }

    /// Actions and outcome of the current round.
    #[must_use]
    pub const fn round_state(&self) -> &RoundState {
        &self.round_state
    }

    /// Rematch flags of the current round.
    #[must_use]
    pub const fn ready_flags(&self) -> ReadyFlags {
        self.ready
    }

    /// The networked pairing, if any.
    #[must_use]
    pub fn session(&self) -> Option<&MatchSession> {
        self.session.as_ref()
    }

    /// Local display name. Empty before `Menu`.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Opponent display name for the current mode.
    #[must_use]
    pub fn opponent_name(&self) -> &str {
        &self.opponent_name
    }

    /// Commentary for the displayed result, once known.
    #[must_use]
    pub fn commentary(&self) -> Option<&str> {
        match &self.commentary {
            CommentarySlot::Ready(text) => Some(text),
            CommentarySlot::Empty | CommentarySlot::Pending { .. } => None,
        }
    }

    /// `true` while commentary for the displayed result is outstanding.
    #[must_use]
    pub fn is_thinking(&self) -> bool {
        matches!(self.commentary, CommentarySlot::Pending { .. })
    }

    /// Networked: we committed this round and the peer has not.
    #[must_use]
    pub fn is_waiting_for_opponent(&self) -> bool {
        self.mode == Some(PlayMode::Networked)
            && self.phase.is_active_round()
            && self.round_state.local_action().is_some()
            && self.round_state.remote_action().is_none()
    }

    /// Networked: we asked for the next round and the peer has not.
    #[must_use]
    pub fn is_waiting_for_rematch(&self) -> bool {
        self.ready.local_ready && !self.ready.remote_ready
    }

    /// The latest user-visible error, if it was not cleared since.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The room id to share while hosting.
    #[must_use]
    pub fn listening_endpoint(&self) -> Option<&EndpointId> {
        self.endpoint.as_ref().and_then(ConnectionEndpoint::listening_on)
    }

    /// `true` once a drop scheduled the automatic return to `Menu`.
    #[must_use]
    pub fn is_returning_to_menu(&self) -> bool {
        self.return_to_menu_at.is_some()
    }

    /// Generation counter bumped by every reset.
    #[must_use]
    pub const fn match_epoch(&self) -> u64 {
        self.match_epoch
    }

    /// The configuration this context was built with.
    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.config
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
    use crate::commentary::CommentaryError;
    use crate::sessions::opponent::ScriptedOpponent;
    use crate::telemetry::CollectingObserver;

    fn automated(script: Vec<Action>) -> MatchContext {
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(script)),
            None,
        );
        ctx.submit_display_name("Ada").unwrap();
        ctx.select_mode(PlayMode::Automated).unwrap();
        ctx
    }

    fn pending_ticket(ctx: &mut MatchContext) -> CommentaryTicket {
        match ctx.take_requests().pop() {
            Some(MatchRequest::Commentary(request)) => request.ticket,
            other => panic!("expected commentary request, got {other:?}"),
        }
    }

    #[test]
    fn blank_name_is_rejected_without_state_change() {
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(vec![])),
            None,
        );
        let err = ctx.submit_display_name("   ").unwrap_err();
        assert_eq!(
            err,
            ArenaError::InvalidRequest {
                kind: InvalidRequestKind::EmptyDisplayName
            }
        );
        assert_eq!(ctx.phase(), MatchPhase::Setup);
        assert_eq!(ctx.events().count(), 0);
    }

    #[test]
    fn name_is_trimmed() {
        let ctx = automated(vec![Action::Rock]);
        assert_eq!(ctx.local_name(), "Ada");
        assert_eq!(ctx.opponent_name(), "CPU");
    }

    #[test]
    fn networked_without_transport_is_unavailable() {
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(vec![])),
            None,
        );
        ctx.submit_display_name("Ada").unwrap();
        let err = ctx.select_mode(PlayMode::Networked).unwrap_err();
        assert_eq!(
            err,
            ArenaError::InvalidRequest {
                kind: InvalidRequestKind::NetworkUnavailable
            }
        );
        assert_eq!(ctx.phase(), MatchPhase::Menu);
    }

    #[test]
    fn automated_round_resolves_immediately() {
        let mut ctx = automated(vec![Action::Scissors]);
        ctx.commit_action(Action::Rock).unwrap();

        assert_eq!(ctx.phase(), MatchPhase::Result);
        assert_eq!(ctx.score(), Score { side_a: 1, side_b: 0 });
        assert_eq!(ctx.round_state().outcome(), Some(Outcome::SideAWins));
        assert!(ctx.is_thinking());
        assert_eq!(ctx.display_round(), 2);
    }

    #[test]
    fn commit_outside_active_round_is_rejected() {
        let mut ctx = automated(vec![Action::Scissors]);
        ctx.commit_action(Action::Rock).unwrap();
        let err = ctx.commit_action(Action::Paper).unwrap_err();
        assert_eq!(
            err,
            ArenaError::WrongPhase {
                operation: "commit_action",
                phase: MatchPhase::Result
            }
        );
        assert_eq!(ctx.score().total(), 1);
    }

    #[test]
    fn hotseat_passes_the_device() {
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(vec![])),
            None,
        );
        ctx.submit_display_name("Ada").unwrap();
        ctx.select_mode(PlayMode::Hotseat).unwrap();
        assert_eq!(ctx.opponent_name(), "Player 2");

        ctx.commit_action(Action::Paper).unwrap();
        assert_eq!(ctx.phase(), MatchPhase::Transition);
        assert!(ctx.round_state().outcome().is_none());

        ctx.confirm_handoff().unwrap();
        assert_eq!(ctx.phase(), MatchPhase::ActiveRound { turn: Side::B });
        ctx.commit_action(Action::Scissors).unwrap();

        assert_eq!(ctx.phase(), MatchPhase::Result);
        assert_eq!(ctx.score(), Score { side_a: 0, side_b: 1 });
    }

    #[test]
    fn local_play_again_clears_round() {
        let mut ctx = automated(vec![Action::Rock]);
        ctx.commit_action(Action::Rock).unwrap();
        assert_eq!(ctx.display_round(), 1);

        ctx.play_again().unwrap();
        assert_eq!(ctx.phase(), MatchPhase::ActiveRound { turn: Side::A });
        assert_eq!(ctx.round(), RoundId::new(1));
        assert_eq!(*ctx.round_state(), RoundState::new());
        assert!(!ctx.is_thinking());
        assert!(ctx.commentary().is_none());
    }

    #[test]
    fn commentary_applies_to_current_result_only() {
        let observer = Arc::new(CollectingObserver::new());
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(vec![Action::Rock])),
            Some(observer.clone()),
        );
        ctx.submit_display_name("Ada").unwrap();
        ctx.select_mode(PlayMode::Automated).unwrap();
        ctx.commit_action(Action::Paper).unwrap();
        let ticket = pending_ticket(&mut ctx);

        let stale = CommentaryTicket {
            round: RoundId::new(7),
            ..ticket
        };
        assert!(!ctx.apply_commentary(CommentaryReply::new(stale, Ok("nope".to_owned()))));
        assert!(observer.has_violation(ViolationKind::Commentary));
        assert!(ctx.is_thinking());

        assert!(ctx.apply_commentary(CommentaryReply::new(
            ticket,
            Err(CommentaryError::Failed("boom".to_owned()))
        )));
        assert_eq!(ctx.commentary(), Some("Ada takes the round!"));
        assert!(!ctx.is_thinking());
        assert_eq!(ctx.phase(), MatchPhase::Result);
    }

    #[test]
    fn late_commentary_after_reset_is_discarded() {
        let mut ctx = automated(vec![Action::Rock]);
        ctx.commit_action(Action::Rock).unwrap();
        let ticket = pending_ticket(&mut ctx);

        ctx.reset().unwrap();
        ctx.select_mode(PlayMode::Automated).unwrap();
        ctx.commit_action(Action::Rock).unwrap();
        let _ = ctx.take_requests();

        assert!(!ctx.apply_commentary(CommentaryReply::new(ticket, Ok("old".to_owned()))));
        assert!(ctx.commentary().is_none());
    }

    #[test]
    fn reset_clears_match_state() {
        let mut ctx = automated(vec![Action::Scissors]);
        ctx.commit_action(Action::Rock).unwrap();
        let epoch = ctx.match_epoch();

        ctx.reset().unwrap();

        assert_eq!(ctx.phase(), MatchPhase::Menu);
        assert_eq!(ctx.score(), Score::default());
        assert_eq!(ctx.round(), RoundId::ZERO);
        assert!(ctx.mode().is_none());
        assert_eq!(ctx.opponent_name(), "Player 2");
        assert_eq!(ctx.match_epoch(), epoch + 1);
    }

    #[test]
    fn reset_in_setup_is_rejected() {
        let mut ctx = MatchContext::new(
            MatchConfig::testing(),
            None,
            Box::new(ScriptedOpponent::new(vec![])),
            None,
        );
        assert!(matches!(
            ctx.reset(),
            Err(ArenaError::WrongPhase { .. })
        ));
    }

    #[test]
    fn event_queue_is_bounded() {
        let config = MatchConfig {
            max_event_queue_size: 2,
            ..MatchConfig::testing()
        };
        let mut ctx = MatchContext::new(
            config,
            None,
            Box::new(ScriptedOpponent::new(vec![Action::Rock])),
            None,
        );
        ctx.submit_display_name("Ada").unwrap();
        ctx.select_mode(PlayMode::Automated).unwrap();
        ctx.commit_action(Action::Paper).unwrap();

        let events: Vec<_> = ctx.events().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], MatchEvent::RoundResolved { .. }));
    }
}
