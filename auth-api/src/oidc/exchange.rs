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

//! Authorization URL construction and authorization code → token exchange.

use serde::Deserialize;
use url::Url;

use crate::error::AuthError;
use crate::http::HttpFetcher;
use crate::secret::SecretString;

use super::pkce;

/// Query parameters of an authorization request.
pub struct AuthorizationParams<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
    pub nonce: &'a str,
    pub code_challenge: &'a str,
    pub extra: &'a [(String, String)],
}

/// Build the authorization URL. Parameters are URL-encoded; `extra` pairs are
/// appended last.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    params: &AuthorizationParams<'_>,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(authorization_endpoint).map_err(|e| {
        AuthError::Discovery(format!(
            "invalid authorization_endpoint {authorization_endpoint:?}: {e}"
        ))
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("response_type", "code");
        pairs.append_pair("client_id", params.client_id);
        pairs.append_pair("redirect_uri", params.redirect_uri);
        pairs.append_pair("scope", &params.scopes.join(" "));
        pairs.append_pair("state", params.state);
        pairs.append_pair("nonce", params.nonce);
        pairs.append_pair("code_challenge", params.code_challenge);
        pairs.append_pair("code_challenge_method", pkce::METHOD);
        for (k, v) in params.extra {
            pairs.append_pair(k, v);
        }
    }

    Ok(url)
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub id_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<i64>,
}

/// Exchange an authorization code at `token_endpoint`.
///
/// `client_secret` is only sent for confidential clients.
#[allow(clippy::too_many_arguments)]
pub async fn exchange_code(
    fetcher: &dyn HttpFetcher,
    token_endpoint: &str,
    client_id: &str,
    client_secret: Option<&str>,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenSet, AuthError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client_id),
        ("code_verifier", code_verifier),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }

    let body = fetcher.post_form(token_endpoint, &form).await.map_err(|e| {
        tracing::warn!(token_endpoint, "authorization code exchange failed: {e}");
        AuthError::CodeExchange(e.to_string())
    })?;

    let resp: TokenEndpointResponse = serde_json::from_slice(&body)
        .map_err(|e| AuthError::CodeExchange(format!("malformed token response: {e}")))?;

    Ok(TokenSet {
        access_token: SecretString::from(resp.access_token),
        id_token: resp.id_token.map(SecretString::from),
        refresh_token: resp.refresh_token.map(SecretString::from),
        expires_in: resp.expires_in,
    })
}
