//! Matches over loopback TCP.
//!
//! Sockets are real, so these tests run one at a time.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use rps_arena::network::codec::encode_message;
use rps_arena::network::codec::MAX_FRAME_LEN;
use rps_arena::prelude::*;
use rps_arena::{Message, PROTOCOL_VERSION};
use serial_test::serial;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const MAX_ROUNDS: usize = 400;

fn tcp_context(name: &str) -> MatchContext {
    let mut ctx = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .with_transport(TcpTransport::new().with_connect_timeout(Duration::from_secs(1)))
        .build()
        .unwrap();
    ctx.submit_display_name(name).unwrap();
    ctx.select_mode(PlayMode::Networked).unwrap();
    ctx
}

fn poll_until<F>(contexts: &mut [&mut MatchContext], done: F)
where
    F: Fn(&[&mut MatchContext]) -> bool,
{
    for _ in 0..MAX_ROUNDS {
        if done(contexts) {
            return;
        }
        for ctx in contexts.iter_mut() {
            ctx.poll();
        }
        thread::sleep(POLL_INTERVAL);
    }
    panic!("condition not reached over tcp");
}

fn frame(msg: &Message) -> Vec<u8> {
    let body = encode_message(msg).unwrap();
    let mut bytes = (body.len() as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(&body);
    bytes
}

/// A host that completed the handshake with a raw socket.
fn host_with_raw_socket() -> (MatchContext, TcpStream) {
    let mut host = tcp_context("Host");
    let addr = host.host_match().unwrap();
    let mut raw = TcpStream::connect(addr.as_str()).unwrap();
    raw.write_all(&frame(&Message::handshake("Raw"))).unwrap();
    poll_until(&mut [&mut host], |c| c[0].phase().is_active_round());
    (host, raw)
}

#[test]
#[serial]
fn full_round_over_loopback() {
    let mut host = tcp_context("Host");
    let mut guest = tcp_context("Guest");
    let addr = host.host_match().unwrap();
    assert!(addr.as_str().starts_with("127.0.0.1:"));

    guest.join_match(addr.as_str()).unwrap();
    poll_until(&mut [&mut host, &mut guest], |c| {
        c.iter().all(|ctx| ctx.phase().is_active_round())
    });
    assert_eq!(host.opponent_name(), "Guest");
    assert_eq!(guest.opponent_name(), "Host");

    host.commit_action(Action::Scissors).unwrap();
    guest.commit_action(Action::Rock).unwrap();
    poll_until(&mut [&mut host, &mut guest], |c| {
        c.iter().all(|ctx| ctx.phase() == MatchPhase::Result)
    });
    assert_eq!(host.round_state().outcome(), Some(Outcome::SideBWins));
    assert_eq!(guest.round_state().outcome(), Some(Outcome::SideAWins));

    host.play_again().unwrap();
    guest.play_again().unwrap();
    poll_until(&mut [&mut host, &mut guest], |c| {
        c.iter()
            .all(|ctx| ctx.round() == RoundId::new(1) && ctx.phase().is_active_round())
    });
}

#[test]
#[serial]
fn dialing_a_closed_port_fails() {
    let mut host = tcp_context("Host");
    let addr = host.host_match().unwrap();
    host.leave_lobby().unwrap();

    let mut guest = tcp_context("Guest");
    let started = Instant::now();
    let err = guest.join_match(addr.as_str()).unwrap_err();
    // tcp_context caps the connect timeout at one second
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, ArenaError::PeerUnavailable { .. }));
    assert!(guest.last_error().is_some());
}

#[test]
#[serial]
fn unparseable_room_id_fails() {
    let mut guest = tcp_context("Guest");
    let err = guest.join_match("room-0001").unwrap_err();
    assert!(matches!(err, ArenaError::PeerUnavailable { .. }));
}

#[test]
#[serial]
fn split_frames_are_reassembled() {
    let (mut host, mut raw) = host_with_raw_socket();
    let bytes = frame(&Message::action_reveal(RoundId::ZERO, Action::Paper));
    let (head, tail) = bytes.split_at(3);
    raw.write_all(head).unwrap();
    host.poll();
    assert!(host.round_state().remote_action().is_none());

    raw.write_all(tail).unwrap();
    poll_until(&mut [&mut host], |c| {
        c[0].round_state().remote_action().is_some()
    });
    assert_eq!(host.round_state().remote_action(), Some(Action::Paper));
}

#[test]
#[serial]
fn oversized_frame_drops_the_match() {
    let (mut host, mut raw) = host_with_raw_socket();
    drop(host.events());

    raw.write_all(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes())
        .unwrap();
    poll_until(&mut [&mut host], |c| c[0].phase() == MatchPhase::Menu);
}

#[test]
#[serial]
fn huge_name_length_drops_the_match() {
    let (mut host, mut raw) = host_with_raw_socket();
    drop(host.events());

    // A legal 14-byte frame: version, Handshake tag, then a 64 TiB name length.
    let mut body = PROTOCOL_VERSION.to_le_bytes().to_vec();
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&(1u64 << 46).to_le_bytes());
    let mut bytes = (body.len() as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(&body);
    raw.write_all(&bytes).unwrap();

    poll_until(&mut [&mut host], |c| c[0].phase() == MatchPhase::Menu);
    let events: Vec<MatchEvent> = host.events().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        MatchEvent::Disconnected { reason } if reason == "Connection lost."
    )));
}

#[test]
#[serial]
fn peer_hangup_is_a_disconnect() {
    let (mut host, raw) = host_with_raw_socket();
    drop(host.events());

    drop(raw);
    poll_until(&mut [&mut host], |c| c[0].phase() == MatchPhase::Menu);
}
