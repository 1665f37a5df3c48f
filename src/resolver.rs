//! Outcome resolution for a single round.

use crate::{Action, Outcome};

/// Compares two actions and reports which side won.
///
/// Equal actions draw. Otherwise `a` wins exactly when it beats `b`.
/// Pure and total.
///
/// ```
/// use rps_arena::{resolve, Action, Outcome};
///
/// assert_eq!(resolve(Action::Rock, Action::Scissors), Outcome::SideAWins);
/// assert_eq!(resolve(Action::Rock, Action::Paper), Outcome::SideBWins);
/// assert_eq!(resolve(Action::Paper, Action::Paper), Outcome::Draw);
/// ```
#[inline]
#[must_use]
pub const fn resolve(a: Action, b: Action) -> Outcome {
    if a as u8 == b as u8 {
        Outcome::Draw
    } else if a.beats(b) {
        Outcome::SideAWins
    } else {
        Outcome::SideBWins
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
    fn full_table() {
        use Action::*;
        use Outcome::*;
        let table = [
            (Rock, Rock, Draw),
            (Rock, Paper, SideBWins),
            (Rock, Scissors, SideAWins),
            (Paper, Rock, SideAWins),
            (Paper, Paper, Draw),
            (Paper, Scissors, SideBWins),
            (Scissors, Rock, SideBWins),
            (Scissors, Paper, SideAWins),
            (Scissors, Scissors, Draw),
        ];
        for (a, b, expected) in table {
            assert_eq!(resolve(a, b), expected, "{a} vs {b}");
        }
    }

    #[test]
    fn swapping_arguments_swaps_the_outcome() {
        for a in Action::ALL {
            for b in Action::ALL {
                assert_eq!(resolve(a, b), resolve(b, a).swapped());
            }
        }
    }
}
