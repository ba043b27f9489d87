//! Screen token generation.

use rand::distr::{Alphanumeric, SampleString as _};

/// Length of a generated screen token (about 190 bits of entropy).
pub const SCREEN_TOKEN_LENGTH: usize = 32;

/// Generate a random, URL-safe screen token from the thread-local CSPRNG.
pub fn generate_screen_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), SCREEN_TOKEN_LENGTH)
}
