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

//! ID token signature and standard-claim verification.

use jsonwebtoken::{decode, decode_header, Validation};

use crate::error::AuthError;

use super::claims::IdTokenClaims;
use super::jwks::JwksCache;

/// Verify `id_token` against the key set at `jwks_uri`.
///
/// The algorithm is pinned to the one published with the key; a header that
/// names a different algorithm is rejected. Checks `exp`, `aud` contains
/// `client_id`, and `iss` equals `issuer`. The nonce is left to the caller,
/// which owns the session it must match.
pub async fn verify_id_token(
    jwks: &JwksCache,
    jwks_uri: &str,
    id_token: &str,
    client_id: &str,
    issuer: &str,
) -> Result<IdTokenClaims, AuthError> {
    let header = decode_header(id_token)
        .map_err(|e| AuthError::TokenVerification(format!("invalid JWT header: {e}")))?;

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| AuthError::TokenVerification("JWT header missing kid".into()))?;

    let jwk = jwks.get_key(jwks_uri, kid).await?;
    if header.alg != jwk.algorithm {
        return Err(AuthError::TokenVerification(format!(
            "JWT alg {:?} does not match key alg {:?}",
            header.alg, jwk.algorithm
        )));
    }

    let mut validation = Validation::new(jwk.algorithm);
    validation.set_audience(&[client_id]);
    validation.set_issuer(&[issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation.validate_exp = true;

    let data = decode::<IdTokenClaims>(id_token, &jwk.decoding_key(), &validation)
        .map_err(|e| AuthError::TokenVerification(e.to_string()))?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jsonwebtoken::{encode, Algorithm, Header};
    use serde_json::json;

    use super::*;
    use crate::oidc::test_support::{id_token_claims, jwks_json, keys, FakeFetcher};

    const ISSUER: &str = "https://accounts.google.com";
    const URI: &str = "https://www.googleapis.com/oauth2/v3/certs";
    const CLIENT: &str = "my-client-id";

    fn cache() -> JwksCache {
        let (k1, _) = keys();
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(URI, jwks_json(&[k1]));
        JwksCache::new(fetcher)
    }

    async fn verify(token: &str) -> Result<IdTokenClaims, AuthError> {
        verify_id_token(&cache(), URI, token, CLIENT, ISSUER).await
    }

    #[tokio::test]
    async fn valid_id_token_verifies() {
        let (k1, _) = keys();
        let token = k1.sign(&id_token_claims(ISSUER, CLIENT, "n-1"));

        let claims = verify(&token).await.expect("should verify");
        assert_eq!(claims.sub, "subject-123");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
        assert_eq!(claims.nonce.as_deref(), Some("n-1"));
    }

    #[tokio::test]
    async fn audience_array_containing_client_is_accepted() {
        let (k1, _) = keys();
        let mut claims = id_token_claims(ISSUER, CLIENT, "n");
        claims["aud"] = json!(["someone-else", CLIENT]);
        assert!(verify(&k1.sign(&claims)).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let (k1, _) = keys();
        let token = k1.sign(&id_token_claims(ISSUER, CLIENT, "n"));
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let token = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            verify(&token).await,
            Err(AuthError::TokenVerification(_))
        ));
    }

    #[tokio::test]
    async fn wrong_issuer_is_rejected() {
        let (k1, _) = keys();
        let token = k1.sign(&id_token_claims("https://evil.example", CLIENT, "n"));
        assert!(verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let (k1, _) = keys();
        let token = k1.sign(&id_token_claims(ISSUER, "other-client", "n"));
        assert!(verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (k1, _) = keys();
        let mut claims = id_token_claims(ISSUER, CLIENT, "n");
        claims["exp"] = json!(1_000_000);
        assert!(verify(&k1.sign(&claims)).await.is_err());
    }

    #[tokio::test]
    async fn token_signed_by_unpublished_key_is_rejected() {
        let (_, k2) = keys();
        let token = k2.sign(&id_token_claims(ISSUER, CLIENT, "n"));
        assert!(matches!(
            verify(&token).await,
            Err(AuthError::KeyNotFound(kid)) if kid == "test-kid-2"
        ));
    }

    #[tokio::test]
    async fn missing_kid_is_rejected() {
        let (k1, _) = keys();
        let token = encode(
            &Header::new(Algorithm::RS256),
            &id_token_claims(ISSUER, CLIENT, "n"),
            &k1.encoding,
        )
        .unwrap();
        assert!(matches!(
            verify(&token).await,
            Err(AuthError::TokenVerification(m)) if m.contains("kid")
        ));
    }

    #[tokio::test]
    async fn algorithm_must_match_key() {
        let (k1, _) = keys();
        let mut header = Header::new(Algorithm::RS512);
        header.kid = Some(k1.kid.clone());
        let token = encode(&header, &id_token_claims(ISSUER, CLIENT, "n"), &k1.encoding).unwrap();
        assert!(matches!(
            verify(&token).await,
            Err(AuthError::TokenVerification(m)) if m.contains("does not match")
        ));
    }
}
