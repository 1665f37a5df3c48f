//! Shared helpers for driving one or two match contexts.

#![allow(dead_code)]

use rps_arena::prelude::*;

/// Maximum poll rounds before a helper gives up.
pub const MAX_POLL_ITERATIONS: usize = 50;

/// An automated-mode context already in its first round.
pub fn automated_context(script: Vec<Action>) -> MatchContext {
    let mut ctx = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .with_opponent(ScriptedOpponent::new(script))
        .build()
        .expect("testing config is valid");
    ctx.submit_display_name("Ada").expect("in setup");
    ctx.select_mode(PlayMode::Automated).expect("in menu");
    ctx
}

/// A hotseat context already in its first round.
pub fn hotseat_context() -> MatchContext {
    let mut ctx = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .build()
        .expect("testing config is valid");
    ctx.submit_display_name("Ada").expect("in setup");
    ctx.select_mode(PlayMode::Hotseat).expect("in menu");
    ctx
}

/// A networked context in `Lobby`, wired to `hub`.
pub fn lobby_context(hub: &MemoryHub, name: &str, config: MatchConfig) -> MatchContext {
    let mut ctx = MatchBuilder::new()
        .with_config(config)
        .with_transport(hub.transport())
        .build()
        .expect("config is valid");
    ctx.submit_display_name(name).expect("in setup");
    ctx.select_mode(PlayMode::Networked).expect("in menu");
    ctx
}

/// Two networked contexts named "Host" and "Guest", both in `Lobby`.
pub fn lobby_pair(hub: &MemoryHub, config: &MatchConfig) -> (MatchContext, MatchContext) {
    (
        lobby_context(hub, "Host", config.clone()),
        lobby_context(hub, "Guest", config.clone()),
    )
}

/// Two networked contexts that completed the handshake and sit in round 0.
///
/// Events emitted while connecting are drained.
pub fn connected_pair(hub: &MemoryHub, config: &MatchConfig) -> (MatchContext, MatchContext) {
    let (mut host, mut guest) = lobby_pair(hub, config);
    let room = host.host_match().expect("hosting works in memory");
    guest.join_match(room.as_str()).expect("room exists");
    pump_until(&mut host, &mut guest, |a, b| {
        a.phase().is_active_round() && b.phase().is_active_round()
    })
    .expect("handshake completes");
    drain_events(&mut host);
    drain_events(&mut guest);
    (host, guest)
}

/// Polls both contexts once.
pub fn pump(a: &mut MatchContext, b: &mut MatchContext) {
    a.poll();
    b.poll();
}

/// Polls both contexts until `done` holds. Returns the number of rounds taken.
pub fn pump_until<F>(a: &mut MatchContext, b: &mut MatchContext, done: F) -> Result<usize, String>
where
    F: Fn(&MatchContext, &MatchContext) -> bool,
{
    for iteration in 0..MAX_POLL_ITERATIONS {
        if done(a, b) {
            return Ok(iteration);
        }
        pump(a, b);
    }
    if done(a, b) {
        return Ok(MAX_POLL_ITERATIONS);
    }
    Err(format!(
        "condition not reached after {MAX_POLL_ITERATIONS} polls: a = {:?}, b = {:?}",
        a.phase(),
        b.phase()
    ))
}

/// Collects every pending event.
pub fn drain_events(ctx: &mut MatchContext) -> Vec<MatchEvent> {
    ctx.events().collect()
}

/// Fulfills every pending commentary request with `service`.
pub fn fulfill_all<S: CommentaryService>(ctx: &mut MatchContext, service: &mut S) -> usize {
    let mut applied = 0;
    for request in ctx.take_requests() {
        let MatchRequest::Commentary(request) = request else {
            continue;
        };
        if ctx.apply_commentary(fulfill(service, &request)) {
            applied += 1;
        }
    }
    applied
}
