use std::sync::Arc;

use crate::sessions::match_context::MatchContext;
use crate::sessions::opponent::{OpponentStrategy, RandomOpponent};
use crate::telemetry::ViolationObserver;
use crate::{ArenaResult, Transport};

// Re-exported so `MatchConfig` can be imported next to the builder.
pub use crate::sessions::config::MatchConfig;

/// The [`MatchBuilder`] builds a [`MatchContext`].
///
/// Without a transport the context still plays automated and hotseat matches; selecting
/// networked mode then fails with
/// [`InvalidRequestKind::NetworkUnavailable`](crate::InvalidRequestKind::NetworkUnavailable).
///
/// ```
/// use rps_arena::prelude::*;
///
/// let hub = MemoryHub::new();
/// let ctx = MatchBuilder::new()
///     .with_config(MatchConfig::testing())
///     .with_transport(hub.transport())
///     .build()
///     .unwrap();
/// assert_eq!(ctx.phase(), MatchPhase::Setup);
/// ```
#[must_use = "MatchBuilder must be consumed by calling build()"]
pub struct MatchBuilder {
    config: MatchConfig,
    transport: Option<Box<dyn Transport>>,
    opponent: Option<Box<dyn OpponentStrategy>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for MatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchBuilder")
            .field("config", &self.config)
            .field("has_transport", &self.transport.is_some())
            .field("has_opponent", &self.opponent.is_some())
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish()
    }
}

impl Default for MatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchBuilder {
    /// Starts from [`MatchConfig::default`] with no transport.
    pub fn new() -> Self {
        Self {
            config: MatchConfig::default(),
            transport: None,
            opponent: None,
            violation_observer: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport networked matches use.
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Replaces the automated opponent. By default a [`RandomOpponent`] is used, seeded from
    /// [`MatchConfig::opponent_seed`] when set.
    pub fn with_opponent<O: OpponentStrategy + 'static>(mut self, opponent: O) -> Self {
        self.opponent = Some(Box::new(opponent));
        self
    }

    /// Sets a custom observer for protocol violations.
    ///
    /// By default violations are logged through `tracing`.
    ///
    /// ```
    /// use rps_arena::prelude::*;
    /// use rps_arena::telemetry::CollectingObserver;
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = MatchBuilder::new().with_violation_observer(observer.clone());
    /// # let _ = builder;
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidRequest`](crate::ArenaError::InvalidRequest) if the
    /// configuration fails [`MatchConfig::validate`].
    pub fn build(self) -> ArenaResult<MatchContext> {
        self.config.validate()?;
        let opponent = match self.opponent {
            Some(opponent) => opponent,
            None => match self.config.opponent_seed {
                Some(seed) => Box::new(RandomOpponent::seeded(seed)),
                None => Box::new(RandomOpponent::from_entropy()),
            },
        };
        Ok(MatchContext::new(
            self.config,
            self.transport,
            opponent,
            self.violation_observer,
        ))
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
    use crate::error::{ArenaError, InvalidRequestKind};
    use crate::MatchPhase;

    #[test]
    fn build_rejects_invalid_config() {
        let err = MatchBuilder::new()
            .with_config(MatchConfig {
                max_event_queue_size: 0,
                ..MatchConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::InvalidRequest {
                kind: InvalidRequestKind::ConfigValueOutOfRange { .. }
            }
        ));
    }

    #[test]
    fn build_starts_in_setup() {
        let ctx = MatchBuilder::default().build().unwrap();
        assert_eq!(ctx.phase(), MatchPhase::Setup);
        assert!(ctx.mode().is_none());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let text = format!("{:?}", MatchBuilder::new());
        assert!(text.contains("has_transport: false"));
    }
}
