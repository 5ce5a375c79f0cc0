//! Anti-CSRF state values for a single authorization flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Random bytes in a state value.
pub const STATE_BYTES: usize = 32;

/// Generate a fresh state value: 32 random bytes, URL-safe base64 without
/// padding.
pub fn new_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare a received state with the issued one in constant time.
pub fn state_matches(received: &str, expected: &str) -> bool {
    let received = received.as_bytes();
    let expected = expected.as_bytes();
    if received.len() != expected.len() {
        return false;
    }
    received
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
