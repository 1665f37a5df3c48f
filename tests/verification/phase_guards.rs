//! Each user operation is offered only in its own phases.
//!
//! A rejected operation returns `WrongPhase` naming itself and the current phase, and leaves
//! the context exactly as it was: same phase, no events.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use rps_arena::prelude::*;

fn setup() -> MatchContext {
    MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .with_transport(MemoryHub::new().transport())
        .with_opponent(ScriptedOpponent::new(vec![Action::Rock]))
        .build()
        .unwrap()
}

fn menu() -> MatchContext {
    let mut ctx = setup();
    ctx.submit_display_name("Ada").unwrap();
    drop(ctx.events());
    ctx
}

fn lobby() -> MatchContext {
    let mut ctx = menu();
    ctx.select_mode(PlayMode::Networked).unwrap();
    drop(ctx.events());
    ctx
}

fn active() -> MatchContext {
    let mut ctx = menu();
    ctx.select_mode(PlayMode::Hotseat).unwrap();
    drop(ctx.events());
    ctx
}

fn transition() -> MatchContext {
    let mut ctx = active();
    ctx.commit_action(Action::Paper).unwrap();
    drop(ctx.events());
    ctx
}

fn result() -> MatchContext {
    let mut ctx = menu();
    ctx.select_mode(PlayMode::Automated).unwrap();
    ctx.commit_action(Action::Paper).unwrap();
    drop(ctx.events());
    ctx
}

macro_rules! rejected_in {
    ($($op:ident in [$($phase:ident),+] => $call:expr;)+) => {
        $($(
            pastey::paste! {
                #[test]
                fn [<$op _is_rejected_in_ $phase>]() {
                    let mut ctx = $phase();
                    let before = ctx.phase();
                    let score = ctx.score();
                    let call: fn(&mut MatchContext) -> ArenaResult<()> = $call;

                    let err = call(&mut ctx).unwrap_err();

                    assert_eq!(
                        err,
                        ArenaError::WrongPhase {
                            operation: stringify!($op),
                            phase: before,
                        }
                    );
                    assert_eq!(ctx.phase(), before);
                    assert_eq!(ctx.score(), score);
                    assert_eq!(ctx.events().len(), 0);
                    assert!(ctx.take_requests().is_empty());
                }
            }
        )+)+
    };
}

rejected_in! {
    submit_display_name in [menu, lobby, active, transition, result]
        => |c| c.submit_display_name("Bo");
    select_mode in [setup, lobby, active, transition, result]
        => |c| c.select_mode(PlayMode::Automated);
    host_match in [setup, menu, active, transition, result]
        => |c| c.host_match().map(drop);
    cancel_hosting in [setup, menu, lobby, active, transition, result]
        => |c| c.cancel_hosting();
    join_match in [setup, menu, active, transition, result]
        => |c| c.join_match("room-0001");
    leave_lobby in [setup, menu, active, transition, result]
        => |c| c.leave_lobby();
    commit_action in [setup, menu, lobby, transition, result]
        => |c| c.commit_action(Action::Rock);
    confirm_handoff in [setup, menu, lobby, active, result]
        => |c| c.confirm_handoff();
    play_again in [setup, menu, lobby, active, transition]
        => |c| c.play_again();
    reset in [setup]
        => |c| c.reset();
}
