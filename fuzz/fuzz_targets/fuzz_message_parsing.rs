//! Fuzz target for network message decoding.
//!
//! Arbitrary bytes arrive from the peer as a frame body. The decoder has to reject
//! anything that is not exactly one message without panicking.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input
//! - A decoded message encodes back to the same bytes

#![no_main]

use libfuzzer_sys::fuzz_target;

use rps_arena::network::codec::{decode_message, encode_message};

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = decode_message(data) {
        // Fixed-int encoding is canonical, so a successful decode re-encodes verbatim.
        let encoded = encode_message(&msg).expect("decoded message must encode");
        assert_eq!(encoded, data);
    }
});
