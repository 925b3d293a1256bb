/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 */

//! Secret-bearing strings, CSPRNG helpers and the one-way token digest.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind every state, nonce, verifier and API token.
pub const SECRET_BYTES: usize = 32;

/// A string that must never be logged or serialized.
///
/// `Debug` prints a placeholder and the type deliberately implements neither
/// `Display` nor `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([redacted])")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fill `SECRET_BYTES` bytes from the OS CSPRNG.
pub fn random_bytes() -> [u8; SECRET_BYTES] {
    let mut buf = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Fresh `SECRET_BYTES` of randomness, base64url without padding.
///
/// Every call draws independently; callers that need several values call it
/// several times rather than deriving one value from another.
pub fn random_urlsafe() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes())
}

/// `base64url(SHA-256(input))`, no padding.
pub fn sha256_urlsafe(input: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_urlsafe_encodes_32_bytes() {
        let value = random_urlsafe();
        // 32 bytes -> 43 base64 characters without padding.
        assert_eq!(value.len(), 43);
        assert_eq!(URL_SAFE_NO_PAD.decode(&value).unwrap().len(), SECRET_BYTES);
        assert!(!value.contains('='));
    }

    #[test]
    fn random_values_differ() {
        assert_ne!(random_urlsafe(), random_urlsafe());
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("abc"), base64url without padding.
        assert_eq!(
            sha256_urlsafe("abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = SecretString::new("hunter2");
        assert!(!format!("{s:?}").contains("hunter2"));
        assert_eq!(s.expose(), "hunter2");
    }
}
