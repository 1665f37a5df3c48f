//! Fuzz target for match configuration.
//!
//! # Safety Properties Tested
//! - `MatchConfig::validate` never panics
//! - `MatchBuilder::build` accepts exactly the configurations `validate` accepts

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use rps_arena::{EndpointId, MatchBuilder, MatchConfig};
use std::time::Duration;

/// Arbitrary configuration inputs
#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    placeholder_opponent_name: String,
    automated_opponent_name: String,
    /// Return delay in ms (covers values far beyond the limit)
    disconnect_return_delay_ms: u32,
    max_event_queue_size: u16,
    preferred_endpoint_id: Option<String>,
    opponent_seed: Option<u64>,
}

fuzz_target!(|input: FuzzConfig| {
    let config = MatchConfig {
        placeholder_opponent_name: input.placeholder_opponent_name,
        automated_opponent_name: input.automated_opponent_name,
        disconnect_return_delay: Duration::from_millis(u64::from(input.disconnect_return_delay_ms)),
        max_event_queue_size: usize::from(input.max_event_queue_size),
        preferred_endpoint_id: input.preferred_endpoint_id.map(EndpointId::new),
        opponent_seed: input.opponent_seed,
    };

    let valid = config.validate().is_ok();
    let built = MatchBuilder::new().with_config(config).build();
    assert_eq!(valid, built.is_ok());
});
