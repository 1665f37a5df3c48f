//! Channel loss and the automatic return to the menu.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::thread;
use std::time::Duration;

use crate::common::{connected_pair, drain_events, lobby_pair, pump, pump_until};
use rps_arena::prelude::*;

const OPPONENT_DISCONNECTED: &str = "Opponent disconnected";
const CONNECTION_LOST: &str = "Connection lost.";

fn delayed(delay: Duration) -> MatchConfig {
    MatchConfig {
        disconnect_return_delay: delay,
        ..MatchConfig::testing()
    }
}

/// Plays one decided round and starts the next, so the score is not zero.
fn play_decided_round(host: &mut MatchContext, guest: &mut MatchContext) {
    host.commit_action(Action::Rock).unwrap();
    guest.commit_action(Action::Scissors).unwrap();
    pump_until(host, guest, |a, b| {
        a.phase() == MatchPhase::Result && b.phase() == MatchPhase::Result
    })
    .unwrap();
    host.play_again().unwrap();
    guest.play_again().unwrap();
    pump_until(host, guest, |a, b| {
        a.round() == RoundId::new(1) && b.round() == RoundId::new(1)
    })
    .unwrap();
    drain_events(host);
    drain_events(guest);
}

#[test]
fn peer_leaving_mid_round_returns_to_menu() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());
    play_decided_round(&mut host, &mut guest);
    host.commit_action(Action::Paper).unwrap();
    assert_eq!(host.score(), Score { side_a: 1, side_b: 0 });

    guest.reset().unwrap();
    host.poll();

    assert_eq!(
        drain_events(&mut host),
        vec![
            MatchEvent::Disconnected {
                reason: OPPONENT_DISCONNECTED.to_owned()
            },
            MatchEvent::Error {
                message: OPPONENT_DISCONNECTED.to_owned()
            },
            MatchEvent::PhaseChanged {
                from: MatchPhase::ActiveRound { turn: Side::A },
                to: MatchPhase::Menu,
            },
        ]
    );
    assert_eq!(host.phase(), MatchPhase::Menu);
    assert_eq!(host.score(), Score::default());
    assert!(host.session().is_none());
    assert!(host.mode().is_none());
}

#[test]
fn error_is_visible_until_the_delay_elapses() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &delayed(Duration::from_millis(40)));
    play_decided_round(&mut host, &mut guest);

    drop(guest);
    host.poll();

    assert_eq!(host.phase(), MatchPhase::ActiveRound { turn: Side::A });
    assert_eq!(host.last_error(), Some(OPPONENT_DISCONNECTED));
    assert!(host.is_returning_to_menu());
    assert_eq!(
        host.commit_action(Action::Rock),
        Err(ArenaError::ChannelNotOpen)
    );

    thread::sleep(Duration::from_millis(60));
    host.poll();

    assert_eq!(host.phase(), MatchPhase::Menu);
    assert_eq!(host.score(), Score::default());
    assert!(host.last_error().is_none());
    assert!(!host.is_returning_to_menu());
}

#[test]
fn reset_cancels_pending_return() {
    let hub = MemoryHub::new();
    let (mut host, guest) = connected_pair(&hub, &MatchConfig::patient());
    drop(guest);
    host.poll();
    assert!(host.is_returning_to_menu());

    host.reset().unwrap();

    assert_eq!(host.phase(), MatchPhase::Menu);
    assert!(!host.is_returning_to_menu());
    // A later poll does not reset the new match.
    host.select_mode(PlayMode::Hotseat).unwrap();
    host.poll();
    assert_eq!(host.phase(), MatchPhase::ActiveRound { turn: Side::A });
}

#[test]
fn severed_link_reports_connection_lost_on_both_sides() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());
    host.commit_action(Action::Rock).unwrap();

    hub.sever_all("cable unplugged");
    pump(&mut host, &mut guest);

    for ctx in [&mut host, &mut guest] {
        let events = drain_events(ctx);
        assert!(events.contains(&MatchEvent::Disconnected {
            reason: CONNECTION_LOST.to_owned()
        }));
        assert_eq!(ctx.phase(), MatchPhase::Menu);
    }
}

#[test]
fn failure_in_lobby_returns_to_role_selection() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = lobby_pair(&hub, &MatchConfig::testing());
    let room = host.host_match().unwrap();
    guest.join_match(room.as_str()).unwrap();

    hub.sever_all("signaling timeout");
    pump(&mut host, &mut guest);

    for ctx in [&mut host, &mut guest] {
        assert_eq!(ctx.phase(), MatchPhase::Lobby);
        assert_eq!(ctx.last_error(), Some(CONNECTION_LOST));
        assert!(ctx.session().unwrap().role().is_none());
        assert!(!ctx.is_returning_to_menu());
    }

    // Both can try again.
    let room = host.host_match().unwrap();
    guest.join_match(room.as_str()).unwrap();
    pump_until(&mut host, &mut guest, |a, b| {
        a.phase().is_active_round() && b.phase().is_active_round()
    })
    .unwrap();
}

#[test]
fn disconnect_after_reset_is_not_reported_twice() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());

    host.reset().unwrap();
    guest.poll();
    drain_events(&mut guest);
    guest.poll();
    host.poll();

    assert_eq!(drain_events(&mut guest), vec![]);
    assert_eq!(drain_events(&mut host), vec![]);
}
