use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::MatchEvent;

/// An opaque iterator that drains events from a [`MatchContext`](crate::MatchContext).
///
/// Wraps the internal queue drain so `std::collections::vec_deque::Drain` stays out of the
/// public API. Events not consumed before the drain is dropped are discarded.
///
/// # Examples
///
/// ```
/// use rps_arena::prelude::*;
///
/// let mut ctx = MatchBuilder::new().with_config(MatchConfig::testing()).build().unwrap();
/// ctx.submit_display_name("Ada").unwrap();
/// for event in ctx.events() {
///     if let MatchEvent::PhaseChanged { to, .. } = event {
///         assert_eq!(to, MatchPhase::Menu);
///     }
/// }
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, MatchEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, MatchEvent>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = MatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use crate::MatchPhase;
    use std::collections::VecDeque;

    fn queue() -> VecDeque<MatchEvent> {
        VecDeque::from(vec![
            MatchEvent::OpponentCommitted,
            MatchEvent::OpponentReady,
            MatchEvent::PhaseChanged {
                from: MatchPhase::Result,
                to: MatchPhase::ActiveRound {
                    turn: crate::Side::A,
                },
            },
        ])
    }

    #[test]
    fn drains_in_order_and_empties_queue() {
        let mut q = queue();
        let drained: Vec<_> = EventDrain::from_drain(q.drain(..)).collect();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], MatchEvent::OpponentCommitted);
        assert!(q.is_empty());
    }

    #[test]
    fn exact_size_and_reverse() {
        let mut q = queue();
        let mut drain = EventDrain::from_drain(q.drain(..));
        assert_eq!(drain.len(), 3);
        assert!(matches!(
            drain.next_back(),
            Some(MatchEvent::PhaseChanged { .. })
        ));
        assert_eq!(drain.len(), 2);
    }

    #[test]
    fn dropping_discards_the_rest() {
        let mut q = queue();
        {
            let mut drain = EventDrain::from_drain(q.drain(..));
            let _ = drain.next();
        }
        assert!(q.is_empty());
    }

    #[test]
    fn fused_after_exhaustion() {
        let mut q = VecDeque::new();
        let mut drain = EventDrain::from_drain(q.drain(..));
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn debug_shows_remaining() {
        let mut q = queue();
        let drain = EventDrain::from_drain(q.drain(..));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 3 }");
    }
}
