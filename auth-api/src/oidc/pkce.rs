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

//! PKCE (RFC 7636), S256 only.

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};

use crate::secret::{random_urlsafe, SecretString};

pub const METHOD: &str = "S256";

/// A fresh code verifier: 32 CSPRNG bytes, base64url (43 characters).
pub fn new_verifier() -> SecretString {
    SecretString::new(random_urlsafe())
}

/// `base64url(SHA-256(verifier))`.
pub fn challenge(verifier: &SecretString) -> String {
    let verifier = PkceCodeVerifier::new(verifier.expose().to_string());
    PkceCodeChallenge::from_code_verifier_sha256(&verifier)
        .as_str()
        .to_string()
}
