//! Sources of the opponent's action in automated mode.

use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::Action;

/// Chooses the automated opponent's action for a round.
pub trait OpponentStrategy {
    /// Returns this round's action. Called once per round, after the local player committed.
    fn choose_action(&mut self) -> Action;
}

/// Picks uniformly at random.
#[derive(Debug, Clone)]
pub struct RandomOpponent<R: Rng = Pcg32> {
    rng: R,
}

impl<R: Rng> RandomOpponent<R> {
    /// Draws from `rng`.
    #[must_use]
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomOpponent<Pcg32> {
    /// A reproducible opponent.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(Pcg32::seed_from_u64(seed))
    }

    /// An opponent seeded from the environment.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(Pcg32::from_entropy())
    }
}

impl<R: Rng> OpponentStrategy for RandomOpponent<R> {
    fn choose_action(&mut self) -> Action {
        self.rng.gen_action()
    }
}

/// Replays a fixed list of actions, starting over at the end.
///
/// ```
/// use rps_arena::{Action, OpponentStrategy, ScriptedOpponent};
///
/// let mut cpu = ScriptedOpponent::new(vec![Action::Rock, Action::Paper]);
/// assert_eq!(cpu.choose_action(), Action::Rock);
/// assert_eq!(cpu.choose_action(), Action::Paper);
/// assert_eq!(cpu.choose_action(), Action::Rock);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOpponent {
    script: Vec<Action>,
    next: usize,
}

impl ScriptedOpponent {
    /// Replays `script`. An empty script always plays [`Action::Rock`].
    #[must_use]
    pub fn new(script: Vec<Action>) -> Self {
        Self { script, next: 0 }
    }
}

impl OpponentStrategy for ScriptedOpponent {
    fn choose_action(&mut self) -> Action {
        let Some(&action) = self.script.get(self.next) else {
            return Action::Rock;
        };
        self.next = (self.next + 1) % self.script.len();
        action
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
    fn seeded_opponents_agree() {
        let mut a = RandomOpponent::seeded(7);
        let mut b = RandomOpponent::seeded(7);
        for _ in 0..50 {
            assert_eq!(a.choose_action(), b.choose_action());
        }
    }

    #[test]
    fn random_opponent_plays_every_action() {
        let mut cpu = RandomOpponent::seeded(3);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[cpu.choose_action() as usize] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn empty_script_plays_rock() {
        let mut cpu = ScriptedOpponent::new(Vec::new());
        assert_eq!(cpu.choose_action(), Action::Rock);
        assert_eq!(cpu.choose_action(), Action::Rock);
    }

    #[test]
    fn script_cycles() {
        let mut cpu = ScriptedOpponent::new(vec![Action::Scissors]);
        for _ in 0..3 {
            assert_eq!(cpu.choose_action(), Action::Scissors);
        }
    }
}
