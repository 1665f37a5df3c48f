//! Commentary requests and replies.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::stubs::{BrokenCommentary, CannedCommentary, DescribingCommentary};
use crate::common::test_utils::fulfill_all;
use crate::common::{automated_context, connected_pair, drain_events, hotseat_context, pump_until};
use rps_arena::prelude::*;
use rps_arena::{CommentaryTicket, UNAVAILABLE_COMMENTARY};

fn single_request(ctx: &mut MatchContext) -> CommentaryRequest {
    let mut requests = ctx.take_requests();
    assert_eq!(requests.len(), 1, "expected exactly one request");
    match requests.remove(0) {
        MatchRequest::Commentary(request) => request,
        other => panic!("unexpected request {other:?}"),
    }
}

#[test]
fn failing_service_still_shows_result_with_fallback() {
    let mut ctx = automated_context(vec![Action::Scissors]);
    ctx.commit_action(Action::Rock).unwrap();

    // The result is on screen before anyone answers.
    assert_eq!(ctx.phase(), MatchPhase::Result);
    assert!(ctx.is_thinking());
    assert!(ctx.commentary().is_none());

    let applied = fulfill_all(
        &mut ctx,
        &mut BrokenCommentary(CommentaryError::Failed("503".to_owned())),
    );
    assert_eq!(applied, 1);
    assert_eq!(ctx.commentary(), Some("Ada takes the round!"));
    assert_eq!(ctx.score(), Score { side_a: 1, side_b: 0 });
    assert_eq!(ctx.round_state().outcome(), Some(Outcome::SideAWins));
    assert!(!ctx.is_thinking());
}

#[test]
fn unavailable_service_invites_a_rematch() {
    let mut ctx = automated_context(vec![Action::Rock]);
    ctx.commit_action(Action::Rock).unwrap();
    fulfill_all(&mut ctx, &mut BrokenCommentary(CommentaryError::Unavailable));
    assert_eq!(ctx.commentary(), Some(UNAVAILABLE_COMMENTARY));
}

#[test]
fn draw_fallback_and_blank_reply() {
    let mut ctx = hotseat_context();
    ctx.commit_action(Action::Paper).unwrap();
    ctx.confirm_handoff().unwrap();
    ctx.commit_action(Action::Paper).unwrap();

    fulfill_all(&mut ctx, &mut CannedCommentary::new("  \n"));
    assert_eq!(ctx.commentary(), Some("It's a draw!"));
}

#[test]
fn reply_updates_in_place() {
    let mut ctx = automated_context(vec![Action::Paper]);
    ctx.commit_action(Action::Scissors).unwrap();
    drain_events(&mut ctx);

    let mut service = CannedCommentary::new("Snip snip.");
    fulfill_all(&mut ctx, &mut service);

    assert_eq!(service.calls.get(), 1);
    assert_eq!(ctx.phase(), MatchPhase::Result);
    assert_eq!(
        drain_events(&mut ctx),
        vec![MatchEvent::CommentaryUpdated {
            round: RoundId::ZERO,
            text: "Snip snip.".to_owned(),
        }]
    );
    assert!(ctx.take_requests().is_empty());
}

#[test]
fn request_describes_the_round() {
    let mut ctx = automated_context(vec![Action::Paper]);
    ctx.commit_action(Action::Rock).unwrap();
    let request = single_request(&mut ctx);

    assert_eq!(request.local_action, Action::Rock);
    assert_eq!(request.remote_action, Action::Paper);
    assert_eq!(request.outcome, Outcome::SideBWins);
    assert_eq!(request.mode, PlayMode::Automated);
    assert_eq!(request.local_name, "Ada");
    assert_eq!(request.opponent_name, "CPU");
    assert_eq!(request.winner_name(), Some("CPU"));
    assert_eq!(request.ticket.round, RoundId::ZERO);
}

#[test]
fn reply_for_a_previous_round_is_discarded() {
    let mut ctx = automated_context(vec![Action::Rock, Action::Rock]);
    ctx.commit_action(Action::Paper).unwrap();
    let old = single_request(&mut ctx);

    ctx.play_again().unwrap();
    ctx.commit_action(Action::Scissors).unwrap();
    let current = single_request(&mut ctx);

    assert!(!ctx.apply_commentary(fulfill(&mut CannedCommentary::new("old news"), &old)));
    assert!(ctx.is_thinking());
    assert!(ctx.apply_commentary(fulfill(&mut CannedCommentary::new("fresh"), &current)));
    assert_eq!(ctx.commentary(), Some("fresh"));
}

#[test]
fn reply_after_play_again_is_discarded() {
    let mut ctx = automated_context(vec![Action::Rock]);
    ctx.commit_action(Action::Paper).unwrap();
    let request = single_request(&mut ctx);

    ctx.play_again().unwrap();
    let reply = CommentaryReply::new(request.ticket, Ok("too late".to_owned()));
    assert!(!ctx.apply_commentary(reply));
    assert!(ctx.commentary().is_none());
}

#[test]
fn reply_with_unknown_ticket_is_discarded() {
    let mut ctx = automated_context(vec![Action::Rock]);
    ctx.commit_action(Action::Paper).unwrap();
    let request = single_request(&mut ctx);

    let forged = CommentaryTicket {
        match_epoch: request.ticket.match_epoch + 1,
        ..request.ticket
    };
    assert!(!ctx.apply_commentary(CommentaryReply::new(forged, Ok("?".to_owned()))));
    assert!(ctx.is_thinking());
}

#[test]
fn networked_request_names_the_peer() {
    let hub = MemoryHub::new();
    let (mut host, mut guest) = connected_pair(&hub, &MatchConfig::testing());
    host.commit_action(Action::Paper).unwrap();
    guest.commit_action(Action::Scissors).unwrap();
    pump_until(&mut host, &mut guest, |a, b| {
        a.phase() == MatchPhase::Result && b.phase() == MatchPhase::Result
    })
    .unwrap();

    fulfill_all(&mut host, &mut DescribingCommentary);
    fulfill_all(&mut guest, &mut DescribingCommentary);

    assert_eq!(
        host.commentary(),
        Some("[ONLINE] Host PAPER vs SCISSORS Guest")
    );
    assert_eq!(
        guest.commentary(),
        Some("[ONLINE] Guest SCISSORS vs PAPER Host")
    );
}
