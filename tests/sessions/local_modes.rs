//! Automated and hotseat matches.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{automated_context, drain_events, hotseat_context};
use rps_arena::prelude::*;
use rps_arena::InvalidRequestKind;

#[test]
fn automated_rock_beats_scripted_scissors() {
    let mut ctx = automated_context(vec![Action::Scissors]);
    drain_events(&mut ctx);

    ctx.commit_action(Action::Rock).unwrap();

    assert_eq!(ctx.phase(), MatchPhase::Result);
    assert_eq!(ctx.round_state().outcome(), Some(Outcome::SideAWins));
    assert_eq!(ctx.score(), Score { side_a: 1, side_b: 0 });

    let events = drain_events(&mut ctx);
    assert_eq!(
        events,
        vec![
            MatchEvent::PhaseChanged {
                from: MatchPhase::ActiveRound { turn: Side::A },
                to: MatchPhase::Result,
            },
            MatchEvent::RoundResolved {
                round: RoundId::ZERO,
                local_action: Action::Rock,
                remote_action: Action::Scissors,
                outcome: Outcome::SideAWins,
                score: Score { side_a: 1, side_b: 0 },
            },
        ]
    );
}

#[test]
fn automated_match_over_several_rounds() {
    let mut ctx = automated_context(vec![Action::Rock, Action::Paper, Action::Scissors]);
    let mine = [Action::Paper, Action::Paper, Action::Paper];
    let expected = [Outcome::SideAWins, Outcome::Draw, Outcome::SideBWins];

    for (round, (action, outcome)) in mine.iter().zip(expected).enumerate() {
        assert_eq!(ctx.round(), RoundId::new(round as u32));
        ctx.commit_action(*action).unwrap();
        assert_eq!(ctx.round_state().outcome(), Some(outcome));
        ctx.play_again().unwrap();
    }

    assert_eq!(ctx.score(), Score { side_a: 1, side_b: 1 });
    // The draw does not count towards the displayed round number.
    assert_eq!(ctx.display_round(), 3);
    assert_eq!(ctx.phase(), MatchPhase::ActiveRound { turn: Side::A });
}

#[test]
fn seeded_random_opponent_is_reproducible() {
    let play = |seed| {
        let mut ctx = MatchBuilder::new()
            .with_config(MatchConfig {
                opponent_seed: Some(seed),
                ..MatchConfig::testing()
            })
            .build()
            .unwrap();
        ctx.submit_display_name("Ada").unwrap();
        ctx.select_mode(PlayMode::Automated).unwrap();
        let mut seen = Vec::new();
        for _ in 0..10 {
            ctx.commit_action(Action::Rock).unwrap();
            seen.push(ctx.round_state().remote_action().unwrap());
            ctx.play_again().unwrap();
        }
        seen
    };
    assert_eq!(play(11), play(11));
}

#[test]
fn hotseat_hides_first_move_behind_transition() {
    let mut ctx = hotseat_context();
    assert_eq!(ctx.opponent_name(), "Player 2");

    ctx.commit_action(Action::Rock).unwrap();
    assert_eq!(ctx.phase(), MatchPhase::Transition);
    assert!(ctx.commit_action(Action::Paper).is_err());

    ctx.confirm_handoff().unwrap();
    ctx.commit_action(Action::Paper).unwrap();

    assert_eq!(ctx.phase(), MatchPhase::Result);
    assert_eq!(ctx.round_state().outcome(), Some(Outcome::SideBWins));
    assert_eq!(ctx.score(), Score { side_a: 0, side_b: 1 });
}

#[test]
fn confirm_handoff_outside_transition_is_rejected() {
    let mut ctx = hotseat_context();
    let err = ctx.confirm_handoff().unwrap_err();
    assert_eq!(
        err,
        ArenaError::WrongPhase {
            operation: "confirm_handoff",
            phase: MatchPhase::ActiveRound { turn: Side::A },
        }
    );
}

#[test]
fn play_again_only_from_result() {
    let mut ctx = hotseat_context();
    assert!(matches!(
        ctx.play_again(),
        Err(ArenaError::WrongPhase { .. })
    ));
}

#[test]
fn operations_in_wrong_phase_leave_state_untouched() {
    let mut ctx = MatchBuilder::new()
        .with_config(MatchConfig::testing())
        .build()
        .unwrap();
    assert!(ctx.select_mode(PlayMode::Hotseat).is_err());
    assert!(ctx.commit_action(Action::Rock).is_err());
    assert!(ctx.host_match().is_err());
    assert!(ctx.leave_lobby().is_err());
    assert_eq!(ctx.phase(), MatchPhase::Setup);
    assert_eq!(drain_events(&mut ctx), vec![]);
}

#[test]
fn display_name_is_required() {
    let mut ctx = MatchBuilder::new().build().unwrap();
    let err = ctx.submit_display_name("\t \n").unwrap_err();
    assert_eq!(
        err,
        ArenaError::InvalidRequest {
            kind: InvalidRequestKind::EmptyDisplayName
        }
    );
    ctx.submit_display_name("  Bo ").unwrap();
    assert_eq!(ctx.local_name(), "Bo");
    assert_eq!(ctx.phase(), MatchPhase::Menu);
}

#[test]
fn reset_returns_to_menu_with_clean_score() {
    let mut ctx = automated_context(vec![Action::Scissors]);
    ctx.commit_action(Action::Rock).unwrap();
    drain_events(&mut ctx);

    ctx.reset().unwrap();

    assert_eq!(ctx.phase(), MatchPhase::Menu);
    assert_eq!(ctx.score(), Score::default());
    assert_eq!(ctx.round(), RoundId::ZERO);
    assert!(ctx.mode().is_none());
    assert!(ctx.commentary().is_none());
    assert_eq!(
        drain_events(&mut ctx),
        vec![MatchEvent::PhaseChanged {
            from: MatchPhase::Result,
            to: MatchPhase::Menu,
        }]
    );

    // A fresh match can start right away and keeps the name.
    ctx.select_mode(PlayMode::Hotseat).unwrap();
    assert_eq!(ctx.local_name(), "Ada");
}
