//! Per-round and per-match counters owned by a [`MatchContext`](crate::MatchContext).

use serde::{Deserialize, Serialize};

use crate::error::{ArenaError, ArenaResult};
use crate::resolver::resolve;
use crate::{Action, Outcome, RoundId, Side};

/// Actions and outcome of the round in progress.
///
/// The outcome is computed the first time both actions are present and never recomputed
/// until the state is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundState {
    local: Option<Action>,
    remote: Option<Action>,
    outcome: Option<Outcome>,
}

impl RoundState {
    /// Creates an empty round.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            local: None,
            remote: None,
            outcome: None,
        }
    }

    /// Side A's action, if committed.
    #[must_use]
    pub const fn local_action(&self) -> Option<Action> {
        self.local
    }

    /// Side B's action, if committed or received.
    #[must_use]
    pub const fn remote_action(&self) -> Option<Action> {
        self.remote
    }

    /// The resolved outcome, if any.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Returns the action recorded for `side`.
    #[must_use]
    pub const fn action(&self, side: Side) -> Option<Action> {
        match side {
            Side::A => self.local,
            Side::B => self.remote,
        }
    }

    /// Records `action` for `side`.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ActionAlreadyCommitted`] if that side already has an action this round.
    pub fn set(&mut self, side: Side, action: Action, round: RoundId) -> ArenaResult<()> {
        let slot = match side {
            Side::A => &mut self.local,
            Side::B => &mut self.remote,
        };
        if slot.is_some() {
            return Err(ArenaError::ActionAlreadyCommitted { round });
        }
        *slot = Some(action);
        Ok(())
    }

    /// Returns `true` when both actions are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.local.is_some() && self.remote.is_some()
    }

    /// Computes the outcome the first time both actions are present.
    ///
    /// Returns `Some` only on that first call; later calls return `None` so the caller
    /// applies the result exactly once.
    pub fn resolve_once(&mut self) -> Option<(Action, Action, Outcome)> {
        if self.outcome.is_some() {
            return None;
        }
        let (local, remote) = (self.local?, self.remote?);
        let outcome = resolve(local, remote);
        self.outcome = Some(outcome);
        Some((local, remote, outcome))
    }

    /// Empties the round.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Round wins per side for the current match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Score {
    /// Rounds won by side A (the local player).
    pub side_a: u32,
    /// Rounds won by side B.
    pub side_b: u32,
}

impl Score {
    /// Adds one to the winning side. Draws change nothing.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome.winner() {
            Some(Side::A) => self.side_a = self.side_a.saturating_add(1),
            Some(Side::B) => self.side_b = self.side_b.saturating_add(1),
            None => {},
        }
    }

    /// Number of decided (non-draw) rounds.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.side_a.saturating_add(self.side_b)
    }

    /// Zeroes both counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Rematch agreement flags for networked play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyFlags {
    /// The local player asked for the next round.
    pub local_ready: bool,
    /// The peer asked for the next round.
    pub remote_ready: bool,
}

impl ReadyFlags {
    /// Both sides agreed.
    #[must_use]
    pub const fn both(&self) -> bool {
        self.local_ready && self.remote_ready
    }

    /// Lowers both flags.
    pub fn clear(&mut self) {
        *self = Self::default();
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

    #[test]
    fn outcome_needs_both_actions() {
        let mut round = RoundState::new();
        round.set(Side::A, Action::Rock, RoundId::ZERO).unwrap();
        assert!(round.resolve_once().is_none());
        assert!(round.outcome().is_none());

        round.set(Side::B, Action::Scissors, RoundId::ZERO).unwrap();
        assert_eq!(
            round.resolve_once(),
            Some((Action::Rock, Action::Scissors, Outcome::SideAWins))
        );
        assert_eq!(round.outcome(), Some(Outcome::SideAWins));
    }

    #[test]
    fn outcome_is_computed_once() {
        let mut round = RoundState::new();
        round.set(Side::B, Action::Paper, RoundId::ZERO).unwrap();
        round.set(Side::A, Action::Paper, RoundId::ZERO).unwrap();
        assert!(round.resolve_once().is_some());
        assert!(round.resolve_once().is_none());
        assert_eq!(round.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn second_action_for_same_side_is_rejected() {
        let mut round = RoundState::new();
        round.set(Side::A, Action::Rock, RoundId::new(4)).unwrap();
        let err = round.set(Side::A, Action::Paper, RoundId::new(4)).unwrap_err();
        assert_eq!(err, ArenaError::ActionAlreadyCommitted { round: RoundId::new(4) });
        assert_eq!(round.local_action(), Some(Action::Rock));
    }

    #[test]
    fn clear_empties_everything() {
        let mut round = RoundState::new();
        round.set(Side::A, Action::Rock, RoundId::ZERO).unwrap();
        round.set(Side::B, Action::Rock, RoundId::ZERO).unwrap();
        let _ = round.resolve_once();
        round.clear();
        assert_eq!(round, RoundState::default());
    }

    #[test]
    fn score_ignores_draws() {
        let mut score = Score::default();
        score.record(Outcome::SideAWins);
        score.record(Outcome::Draw);
        score.record(Outcome::SideBWins);
        score.record(Outcome::SideBWins);
        assert_eq!(score, Score { side_a: 1, side_b: 2 });
        assert_eq!(score.total(), 3);
        score.reset();
        assert_eq!(score.total(), 0);
    }

    #[test]
    fn ready_flags_need_both() {
        let mut flags = ReadyFlags::default();
        flags.local_ready = true;
        assert!(!flags.both());
        flags.remote_ready = true;
        assert!(flags.both());
        flags.clear();
        assert!(!flags.local_ready && !flags.remote_ready);
    }
}
