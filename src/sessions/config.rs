//! Configuration for a [`MatchContext`](crate::MatchContext).
//!
//! # Example
//!
//! ```
//! use rps_arena::MatchConfig;
//! use web_time::Duration;
//!
//! let config = MatchConfig {
//!     disconnect_return_delay: Duration::from_secs(1),
//!     ..MatchConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use web_time::Duration;

use crate::error::{ArenaError, InvalidRequestKind};
use crate::EndpointId;

/// Default name shown for the second hotseat player and for a peer before its handshake.
pub const DEFAULT_PLACEHOLDER_NAME: &str = "Player 2";
/// Default name of the automated opponent.
pub const DEFAULT_AUTOMATED_NAME: &str = "CPU";
/// Oldest events are dropped once the queue holds this many.
pub const DEFAULT_MAX_EVENT_QUEUE_SIZE: usize = 100;

const MAX_RETURN_DELAY_MS: u64 = 60_000;
const MAX_EVENT_QUEUE_LIMIT: usize = 4096;

/// Settings of a match.
///
/// # Forward Compatibility
///
/// New fields may be added in future versions. Construct with
/// `..MatchConfig::default()` to keep compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "MatchConfig has no effect unless passed to MatchBuilder::with_config()"]
pub struct MatchConfig {
    /// Opponent name in hotseat mode, and in networked mode until the handshake arrives.
    pub placeholder_opponent_name: String,

    /// Opponent name in automated mode.
    pub automated_opponent_name: String,

    /// How long a dropped match keeps showing the error before it returns to the menu.
    ///
    /// The return happens on the first [`poll`](crate::MatchContext::poll) after the delay.
    ///
    /// Default: 3 seconds. Valid range: 0 to 60 seconds.
    pub disconnect_return_delay: Duration,

    /// Maximum number of undrained [`MatchEvent`](crate::MatchEvent)s kept.
    ///
    /// Default: 100. Valid range: 1 to 4096.
    pub max_event_queue_size: usize,

    /// Identifier to ask the transport for when hosting. Transports may ignore it.
    pub preferred_endpoint_id: Option<EndpointId>,

    /// Seed for the default automated opponent. `None` seeds from entropy.
    pub opponent_seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            placeholder_opponent_name: DEFAULT_PLACEHOLDER_NAME.to_owned(),
            automated_opponent_name: DEFAULT_AUTOMATED_NAME.to_owned(),
            disconnect_return_delay: Duration::from_secs(3),
            max_event_queue_size: DEFAULT_MAX_EVENT_QUEUE_SIZE,
            preferred_endpoint_id: None,
            opponent_seed: None,
        }
    }
}

impl MatchConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic settings for tests: no return delay and a seeded opponent.
    ///
    /// ```
    /// use rps_arena::MatchConfig;
    ///
    /// let config = MatchConfig::testing();
    /// assert!(config.disconnect_return_delay.is_zero());
    /// assert_eq!(config.opponent_seed, Some(42));
    /// ```
    pub fn testing() -> Self {
        Self {
            disconnect_return_delay: Duration::ZERO,
            opponent_seed: Some(42),
            ..Self::default()
        }
    }

    /// Keeps a dropped match on screen for ten seconds.
    pub fn patient() -> Self {
        Self {
            disconnect_return_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Checks every field against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidRequest`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.disconnect_return_delay > Duration::from_millis(MAX_RETURN_DELAY_MS) {
            return Err(InvalidRequestKind::DurationConfigOutOfRange {
                field: "disconnect_return_delay",
                min_ms: 0,
                max_ms: MAX_RETURN_DELAY_MS,
                actual_ms: self.disconnect_return_delay.as_millis() as u64,
            }
            .into());
        }

        if self.max_event_queue_size < 1 || self.max_event_queue_size > MAX_EVENT_QUEUE_LIMIT {
            return Err(InvalidRequestKind::ConfigValueOutOfRange {
                field: "max_event_queue_size",
                min: 1,
                max: MAX_EVENT_QUEUE_LIMIT as u64,
                actual: self.max_event_queue_size as u64,
            }
            .into());
        }

        Ok(())
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
    fn defaults_are_valid() {
        let config = MatchConfig::default();
        assert_eq!(config.placeholder_opponent_name, "Player 2");
        assert_eq!(config.automated_opponent_name, "CPU");
        assert_eq!(config.disconnect_return_delay, Duration::from_secs(3));
        assert_eq!(config.max_event_queue_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_are_valid() {
        assert!(MatchConfig::testing().validate().is_ok());
        assert!(MatchConfig::patient().validate().is_ok());
        assert_eq!(
            MatchConfig::patient().disconnect_return_delay,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn return_delay_boundaries() {
        let config = MatchConfig {
            disconnect_return_delay: Duration::from_secs(60),
            ..MatchConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = MatchConfig {
            disconnect_return_delay: Duration::from_millis(60_001),
            ..MatchConfig::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            ArenaError::InvalidRequest {
                kind: InvalidRequestKind::DurationConfigOutOfRange {
                    field: "disconnect_return_delay",
                    actual_ms: 60_001,
                    ..
                }
            }
        ));
    }

    #[test]
    fn event_queue_size_boundaries() {
        for (size, ok) in [(0, false), (1, true), (4096, true), (4097, false)] {
            let config = MatchConfig {
                max_event_queue_size: size,
                ..MatchConfig::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "size {size}");
        }
    }
}
