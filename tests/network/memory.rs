//! Several pairings sharing one in-memory hub.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use crate::common::test_utils::lobby_context;
use crate::common::{connected_pair, pump_until};
use rps_arena::prelude::*;
use rps_arena::telemetry::{CollectingObserver, ViolationKind};
use rps_arena::{ChannelEvent, Message};

#[test]
fn independent_pairings_do_not_interfere() {
    let hub = MemoryHub::new();
    let (mut a1, mut b1) = connected_pair(&hub, &MatchConfig::testing());
    let (mut a2, mut b2) = connected_pair(&hub, &MatchConfig::testing());

    a1.commit_action(Action::Rock).unwrap();
    b1.commit_action(Action::Paper).unwrap();
    a2.commit_action(Action::Scissors).unwrap();
    b2.commit_action(Action::Paper).unwrap();

    let resolved = |a: &MatchContext, b: &MatchContext| {
        a.phase() == MatchPhase::Result && b.phase() == MatchPhase::Result
    };
    pump_until(&mut a1, &mut b1, resolved).unwrap();
    pump_until(&mut a2, &mut b2, resolved).unwrap();

    assert_eq!(a1.round_state().outcome(), Some(Outcome::SideBWins));
    assert_eq!(a2.round_state().outcome(), Some(Outcome::SideAWins));
}

#[test]
fn third_player_is_turned_away() {
    let hub = MemoryHub::new();
    let observer = Arc::new(CollectingObserver::new());
    let mut host = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .with_transport(hub.transport())
        .with_violation_observer(observer.clone())
        .build()
        .unwrap();
    host.submit_display_name("Host").unwrap();
    host.select_mode(PlayMode::Networked).unwrap();
    let room = host.host_match().unwrap();

    // Both dial before the host gets to accept either.
    let mut first = hub.transport().dial(&room).unwrap();
    let mut second = hub.transport().dial(&room).unwrap();
    first.send(&Message::handshake("First")).unwrap();
    host.poll();

    assert_eq!(host.opponent_name(), "First");
    assert!(observer.has_violation(ViolationKind::Channel));
    assert_eq!(second.receive_all(), vec![ChannelEvent::Closed]);
    assert!(first.is_open());
}

#[test]
fn preferred_room_id_is_used_when_free() {
    let hub = MemoryHub::new();
    let config = MatchConfig {
        preferred_endpoint_id: Some(EndpointId::from("friday-night")),
        ..MatchConfig::testing()
    };
    let mut host = lobby_context(&hub, "Host", config.clone());
    assert_eq!(host.host_match().unwrap().as_str(), "friday-night");

    // The id is taken, so a second host fails and can retry.
    let mut rival = lobby_context(&hub, "Rival", config);
    assert!(matches!(
        rival.host_match(),
        Err(ArenaError::SocketError { .. })
    ));
    assert!(rival.last_error().is_some());
    assert_eq!(rival.phase(), MatchPhase::Lobby);
}
