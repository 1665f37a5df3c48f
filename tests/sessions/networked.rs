//! Networked matches over the in-memory transport.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use crate::common::test_utils::lobby_context;
use crate::common::{connected_pair, drain_events, lobby_pair, pump, pump_until};
use rps_arena::prelude::*;
use rps_arena::telemetry::{CollectingObserver, ViolationKind};
use rps_arena::{
    assert_no_violations, assert_violation, InvalidRequestKind, Message, MessageHeader,
};

fn both_in_result(a: &MatchContext, b: &MatchContext) -> bool {
    a.phase() == MatchPhase::Result && b.phase() == MatchPhase::Result
}

fn both_in_round(round: u32) -> impl Fn(&MatchContext, &MatchContext) -> bool {
    move |a, b| {
        a.round() == RoundId::new(round)
            && b.round() == RoundId::new(round)
            && a.phase().is_active_round()
            && b.phase().is_active_round()
    }
}

/// A host context plus a raw channel standing in for the peer.
fn host_with_raw_peer(
    hub: &MemoryHub,
    observer: Arc<CollectingObserver>,
) -> (MatchContext, Box<dyn Channel>) {
    let mut host = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .with_transport(hub.transport())
        .with_violation_observer(observer)
        .build()
        .unwrap();
    host.submit_display_name("Host").unwrap();
    host.select_mode(PlayMode::Networked).unwrap();
    let room = host.host_match().unwrap();

    let mut peer = hub.transport().dial(&room).unwrap();
    peer.send(&Message::handshake("Raw")).unwrap();
    host.poll();
    assert_eq!(host.phase(), MatchPhase::ActiveRound { turn: Side::A });

    // The host's own handshake.
    let received = peer.receive_all();
    assert_eq!(
        received,
        vec![rps_arena::ChannelEvent::Message(Message::handshake("Host"))]
    );
    drain_events(&mut host);
    (host, peer)
}

#[test]
fn handshake_moves_both_sides_into_the_first_round() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = lobby_pair(&hub, &MatchConfig::testing());
    drain_events(&mut host);
    drain_events(&mut guest);

    let room = host.host_match().unwrap();
    assert_eq!(room.as_str(), "room-0001");
    assert_eq!(host.listening_endpoint(), Some(&room));
    assert_eq!(host.host_match().unwrap(), room);

    guest.join_match(&format!("  {room} ")).unwrap();
    pump_until(&mut host, &mut guest, |a, b| {
        a.phase().is_active_round() && b.phase().is_active_round()
    })
    .unwrap();

    assert_eq!(host.opponent_name(), "Guest");
    assert_eq!(guest.opponent_name(), "Host");
    assert_eq!(
        host.session().unwrap().role(),
        Some(ConnectionRole::Acceptor)
    );
    assert_eq!(
        guest.session().unwrap().role(),
        Some(ConnectionRole::Initiator)
    );
    // Hosting stops once the peer is connected.
    assert!(host.listening_endpoint().is_none());
    assert_eq!(hub.listener_count(), 0);

    assert_eq!(
        drain_events(&mut host),
        vec![
            MatchEvent::ListeningOn {
                endpoint: room.clone()
            },
            MatchEvent::ConnectionOpened {
                role: ConnectionRole::Acceptor
            },
            MatchEvent::HandshakeCompleted {
                remote_name: "Guest".to_owned()
            },
            MatchEvent::PhaseChanged {
                from: MatchPhase::Lobby,
                to: MatchPhase::ActiveRound { turn: Side::A },
            },
        ]
    );
    assert_eq!(
        drain_events(&mut guest),
        vec![
            MatchEvent::ConnectionOpened {
                role: ConnectionRole::Initiator
            },
            MatchEvent::HandshakeCompleted {
                remote_name: "Host".to_owned()
            },
            MatchEvent::PhaseChanged {
                from: MatchPhase::Lobby,
                to: MatchPhase::ActiveRound { turn: Side::A },
            },
        ]
    );
}

#[test]
fn opposite_arrival_order_resolves_identically() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());

    // Both commit before either hears from the other.
    host.commit_action(Action::Paper).unwrap();
    guest.commit_action(Action::Scissors).unwrap();
    assert!(host.is_waiting_for_opponent());
    assert!(guest.is_waiting_for_opponent());

    pump_until(&mut host, &mut guest, both_in_result).unwrap();

    // Scissors beats paper on both screens.
    assert_eq!(host.round_state().outcome(), Some(Outcome::SideBWins));
    assert_eq!(guest.round_state().outcome(), Some(Outcome::SideAWins));
    assert_eq!(host.score(), Score { side_a: 0, side_b: 1 });
    assert_eq!(guest.score(), Score { side_a: 1, side_b: 0 });
}

#[test]
fn remote_reveal_first_then_local_commit_resolves() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());

    guest.commit_action(Action::Rock).unwrap();
    pump(&mut host, &mut guest);
    assert_eq!(host.phase(), MatchPhase::ActiveRound { turn: Side::A });
    assert_eq!(drain_events(&mut host), vec![MatchEvent::OpponentCommitted]);
    assert!(!host.is_waiting_for_opponent());

    host.commit_action(Action::Rock).unwrap();
    assert_eq!(host.phase(), MatchPhase::Result);
    assert_eq!(host.round_state().outcome(), Some(Outcome::Draw));

    pump(&mut host, &mut guest);
    assert_eq!(guest.phase(), MatchPhase::Result);
    assert_eq!(guest.round_state().outcome(), Some(Outcome::Draw));
    assert_eq!(host.score(), Score::default());
}

#[test]
fn second_commit_in_a_round_is_rejected() {
    let hub = MemoryHub::new();
    let (mut host, _guest) = connected_pair(&hub, &MatchConfig::testing());

    host.commit_action(Action::Rock).unwrap();
    let err = host.commit_action(Action::Paper).unwrap_err();
    assert_eq!(
        err,
        ArenaError::ActionAlreadyCommitted {
            round: RoundId::ZERO
        }
    );
    assert_eq!(host.round_state().local_action(), Some(Action::Rock));
}

#[test]
fn rematch_needs_both_sides() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());
    host.commit_action(Action::Rock).unwrap();
    guest.commit_action(Action::Scissors).unwrap();
    pump_until(&mut host, &mut guest, both_in_result).unwrap();
    drain_events(&mut host);
    drain_events(&mut guest);

    host.play_again().unwrap();
    host.play_again().unwrap();
    assert_eq!(host.phase(), MatchPhase::Result);
    assert!(host.is_waiting_for_rematch());

    pump(&mut host, &mut guest);
    assert_eq!(guest.phase(), MatchPhase::Result);
    assert_eq!(drain_events(&mut guest), vec![MatchEvent::OpponentReady]);
    assert!(guest.ready_flags().remote_ready);

    guest.play_again().unwrap();
    assert_eq!(guest.phase(), MatchPhase::ActiveRound { turn: Side::A });
    assert_eq!(guest.round(), RoundId::new(1));

    pump_until(&mut host, &mut guest, both_in_round(1)).unwrap();
    assert_eq!(*host.round_state(), RoundState::new());
    assert_eq!(host.ready_flags(), ReadyFlags::default());
    // Score survives the rematch.
    assert_eq!(host.score(), Score { side_a: 1, side_b: 0 });
}

#[test]
fn scores_mirror_over_many_rounds() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());
    let host_moves = [Action::Rock, Action::Paper, Action::Scissors, Action::Rock];
    let guest_moves = [Action::Paper, Action::Paper, Action::Rock, Action::Scissors];

    for (round, (h, g)) in host_moves.iter().zip(guest_moves).enumerate() {
        // Alternate who commits first.
        if round % 2 == 0 {
            host.commit_action(*h).unwrap();
            pump(&mut host, &mut guest);
            guest.commit_action(g).unwrap();
        } else {
            guest.commit_action(g).unwrap();
            pump(&mut host, &mut guest);
            host.commit_action(*h).unwrap();
        }
        pump_until(&mut host, &mut guest, both_in_result).unwrap();
        assert_eq!(
            host.round_state().outcome().unwrap(),
            guest.round_state().outcome().unwrap().swapped()
        );

        guest.play_again().unwrap();
        host.play_again().unwrap();
        pump_until(&mut host, &mut guest, both_in_round(round as u32 + 1)).unwrap();
    }

    assert_eq!(host.score(), Score { side_a: 1, side_b: 2 });
    assert_eq!(host.score().side_a, guest.score().side_b);
    assert_eq!(host.score().side_b, guest.score().side_a);
}

#[test]
fn duplicate_handshake_only_renames() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let (mut host, mut peer) = host_with_raw_peer(&hub, observer.clone());

    peer.send(&Message::handshake("Raw Renamed")).unwrap();
    host.poll();

    assert_eq!(host.phase(), MatchPhase::ActiveRound { turn: Side::A });
    assert_eq!(host.opponent_name(), "Raw Renamed");
    assert_eq!(host.session().unwrap().remote_name(), "Raw Renamed");
    assert_eq!(drain_events(&mut host), vec![]);
    assert_no_violations!(observer);
}

#[test]
fn stale_and_duplicate_reveals_are_dropped() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let (mut host, mut peer) = host_with_raw_peer(&hub, observer.clone());

    peer.send(&Message::action_reveal(RoundId::new(3), Action::Rock))
        .unwrap();
    host.poll();
    assert!(host.round_state().remote_action().is_none());
    assert_violation!(observer, ViolationKind::SessionProtocol);
    observer.clear();

    peer.send(&Message::action_reveal(RoundId::ZERO, Action::Paper))
        .unwrap();
    peer.send(&Message::action_reveal(RoundId::ZERO, Action::Scissors))
        .unwrap();
    host.poll();
    assert_eq!(host.round_state().remote_action(), Some(Action::Paper));
    assert_eq!(observer.violations_of_kind(ViolationKind::SessionProtocol).len(), 1);
    assert_eq!(drain_events(&mut host), vec![MatchEvent::OpponentCommitted]);

    host.commit_action(Action::Scissors).unwrap();
    assert_eq!(host.round_state().outcome(), Some(Outcome::SideAWins));
}

#[test]
fn future_round_rematch_ready_is_dropped() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let (mut host, mut peer) = host_with_raw_peer(&hub, observer.clone());

    // Round 7 has not been reached yet.
    peer.send(&Message::rematch_ready(RoundId::new(7))).unwrap();
    host.poll();
    assert!(!host.ready_flags().remote_ready);
    assert_violation!(observer, ViolationKind::SessionProtocol);
}

#[test]
fn current_round_rematch_ready_before_result_is_kept() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let (mut host, mut peer) = host_with_raw_peer(&hub, observer.clone());

    peer.send(&Message::rematch_ready(RoundId::ZERO)).unwrap();
    host.poll();
    assert!(host.ready_flags().remote_ready);
    assert!(host.phase().is_active_round());
    assert_no_violations!(observer);
}

#[test]
fn foreign_protocol_version_is_dropped() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let (mut host, mut peer) = host_with_raw_peer(&hub, observer.clone());

    let mut msg = Message::action_reveal(RoundId::ZERO, Action::Rock);
    msg.header = MessageHeader { version: 99 };
    peer.send(&msg).unwrap();
    host.poll();

    assert!(host.round_state().remote_action().is_none());
    assert_violation!(observer, ViolationKind::SessionProtocol);
}

#[test]
fn joining_unknown_room_reports_connection_failure() {
    let hub = MemoryHub::new();
    let mut guest = lobby_context(&hub, "Guest", MatchConfig::testing());
    drain_events(&mut guest);

    let err = guest.join_match("room-9999").unwrap_err();
    assert!(matches!(err, ArenaError::PeerUnavailable { .. }));
    assert_eq!(guest.phase(), MatchPhase::Lobby);
    assert_eq!(
        guest.last_error(),
        Some("Connection failed. Please check the Room ID and try again.")
    );
    assert!(guest.session().unwrap().role().is_none());
    assert!(matches!(
        drain_events(&mut guest).as_slice(),
        [MatchEvent::Error { .. }]
    ));

    // The player can try again.
    let mut host = lobby_context(&hub, "Host", MatchConfig::testing());
    let room = host.host_match().unwrap();
    guest.join_match(room.as_str()).unwrap();
    assert!(guest.last_error().is_none());
}

#[test]
fn blank_room_id_is_rejected() {
    let hub = MemoryHub::new();
    let mut guest = lobby_context(&hub, "Guest", MatchConfig::testing());
    let err = guest.join_match("   ").unwrap_err();
    assert_eq!(
        err,
        ArenaError::InvalidRequest {
            kind: InvalidRequestKind::EmptyEndpointId
        }
    );
}

#[test]
fn joining_while_hosting_switches_roles() {
    let hub = MemoryHub::new();
    let mut a = lobby_context(&hub, "A", MatchConfig::testing());
    let mut b = lobby_context(&hub, "B", MatchConfig::testing());
    a.host_match().unwrap();
    let room_b = b.host_match().unwrap();
    assert_eq!(hub.listener_count(), 2);

    a.join_match(room_b.as_str()).unwrap();
    assert_eq!(hub.listener_count(), 1);
    assert_eq!(a.session().unwrap().role(), Some(ConnectionRole::Initiator));
    assert!(matches!(a.host_match(), Err(ArenaError::WrongPhase { .. })));

    pump_until(&mut a, &mut b, |a, b| {
        a.phase().is_active_round() && b.phase().is_active_round()
    })
    .unwrap();
}

#[test]
fn cancel_hosting_stops_listening() {
    let hub = MemoryHub::new();
    let mut host = lobby_context(&hub, "Host", MatchConfig::testing());
    assert!(host.cancel_hosting().is_err());

    let room = host.host_match().unwrap();
    host.cancel_hosting().unwrap();

    assert_eq!(host.phase(), MatchPhase::Lobby);
    assert!(host.listening_endpoint().is_none());
    assert!(matches!(
        hub.transport().dial(&room),
        Err(ArenaError::PeerUnavailable { .. })
    ));
}

#[test]
fn leave_lobby_closes_everything() {
    let hub = MemoryHub::new();
    let mut host = lobby_context(&hub, "Host", MatchConfig::testing());
    host.host_match().unwrap();

    host.leave_lobby().unwrap();

    assert_eq!(host.phase(), MatchPhase::Menu);
    assert!(host.session().is_none());
    assert!(host.mode().is_none());
    assert_eq!(hub.listener_count(), 0);

    // The endpoint is reusable for the next networked match.
    host.select_mode(PlayMode::Networked).unwrap();
    host.host_match().unwrap();
}
