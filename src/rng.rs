//! Random source of the automated opponent.
//!
//! A small PCG32 generator, so a fixed seed pins every action the computer plays
//! across platforms and releases.
//!
//! ```rust
//! use rps_arena::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut cpu = Pcg32::seed_from_u64(12345);
//! let first = cpu.gen_action();
//! assert_eq!(Pcg32::seed_from_u64(12345).gen_action(), first);
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
    Action,
};

/// PCG-XSH-RR with 64 bits of state and 32-bit output. Not cryptographically secure.
///
/// Reference: <https://www.pcg-random.org/>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

const STREAM: u64 = 0x5eed_a7e7_a5c1_55e5;
const MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a generator at `state` on `stream`. Distinct streams never overlap.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.step();
        pcg.state = pcg.state.wrapping_add(state);
        pcg.step();
        pcg
    }

    #[inline]
    const fn step(&mut self) {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(self.inc);
    }
}

/// Constructors for seeded generators.
pub trait SeedableRng: Sized {
    /// Same seed, same sequence.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Seeds from process randomness and the clock.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, STREAM)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(entropy_seed())
    }
}

/// Uniform draws.
pub trait Rng {
    /// Returns the next raw 32-bit value.
    fn next_u32(&mut self) -> u32;

    /// Returns a value in `0..bound`, without modulo bias.
    ///
    /// A zero bound is reported as a violation and yields zero.
    fn gen_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_below called with a zero bound"
            );
            return 0;
        }
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let value = self.next_u32();
            if value >= threshold {
                return value % bound;
            }
        }
    }

    /// Picks one of the three actions with equal probability.
    fn gen_action(&mut self) -> Action {
        match self.gen_below(3) {
            0 => Action::Rock,
            1 => Action::Paper,
            _ => Action::Scissors,
        }
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.step();
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        xorshifted.rotate_right((old >> 59) as u32)
    }
}

// SipHash keys are random per process; the clock and thread id keep two opponents created
// in the same instant apart.
fn entropy_seed() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
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
    fn same_seed_same_actions() {
        let mut a = Pcg32::seed_from_u64(12345);
        let mut b = Pcg32::seed_from_u64(12345);
        for _ in 0..500 {
            assert_eq!(a.gen_action(), b.gen_action());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(12345);
        let mut b = Pcg32::seed_from_u64(54321);
        let same = (0..100).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 10);
    }

    #[test]
    fn actions_are_roughly_uniform() {
        let mut rng = Pcg32::seed_from_u64(42);
        let mut counts = [0u32; 3];
        for _ in 0..30000 {
            counts[rng.gen_action() as usize] += 1;
        }
        for count in counts {
            assert!((9000..11000).contains(&count), "skewed draw: {counts:?}");
        }
    }

    #[test]
    fn zero_bound_yields_zero() {
        let mut rng = Pcg32::seed_from_u64(7);
        assert_eq!(rng.gen_below(0), 0);
    }

    #[test]
    fn entropy_generators_still_draw_actions() {
        let mut rng = Pcg32::from_entropy();
        assert!(Action::ALL.contains(&rng.gen_action()));
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_gen_below_stays_in_bounds(seed in any::<u64>(), bound in 1u32..1000) {
            let mut rng = Pcg32::seed_from_u64(seed);
            for _ in 0..100 {
                prop_assert!(rng.gen_below(bound) < bound);
            }
        }

        #[test]
        fn prop_clone_continues_the_sequence(seed in any::<u64>(), advance in 0usize..100) {
            let mut rng = Pcg32::seed_from_u64(seed);
            for _ in 0..advance {
                let _ = rng.gen_action();
            }
            let mut cloned = rng.clone();
            for _ in 0..20 {
                prop_assert_eq!(rng.gen_action(), cloned.gen_action());
            }
        }
    }
}
