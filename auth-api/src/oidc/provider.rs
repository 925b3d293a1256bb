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

//! Per-identity-provider strategy.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::AuthError;
use crate::http::HttpFetcher;
use crate::secret::SecretString;

use super::claims::{fetch_userinfo, Claims};
use super::discovery::DiscoveryCache;
use super::exchange::{build_authorization_url, exchange_code, AuthorizationParams, TokenSet};
use super::jwks::JwksCache;
use super::verify::verify_id_token;

pub const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

/// Which provider-specific claims and authorization parameters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Microsoft,
    Generic,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Some(Self::Google),
            "microsoft" => Some(Self::Microsoft),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Kind implied by a provider's configured name.
    pub fn for_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "google" => Self::Google,
            "microsoft" | "azure" | "entra" => Self::Microsoft,
            _ => Self::Generic,
        }
    }

    fn default_auth_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Google => &[("access_type", "offline"), ("prompt", "select_account")],
            Self::Microsoft | Self::Generic => &[],
        }
    }
}

/// Static configuration of one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub scopes: Vec<String>,
    pub extra_auth_params: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn new(name: &str, issuer: &str, client_id: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ProviderKind::for_name(name),
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
            client_secret: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_auth_params: Vec::new(),
        }
    }
}

/// Per-flow inputs to an authorization URL.
pub struct AuthorizationRequest<'a> {
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub nonce: &'a str,
    pub code_challenge: &'a str,
    /// Overrides the configured scopes when non-empty.
    pub scopes: &'a [String],
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Verify the ID token and decode standard plus provider-specific
    /// claims. `access_token` enables the UserInfo fallback.
    async fn validate_id_token(
        &self,
        id_token: &str,
        access_token: Option<&str>,
        config: &ProviderConfig,
    ) -> Result<Claims, AuthError>;

    async fn authorization_url(
        &self,
        config: &ProviderConfig,
        request: &AuthorizationRequest<'_>,
    ) -> Result<Url, AuthError>;

    async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
        code_verifier: &SecretString,
        redirect_uri: &str,
    ) -> Result<TokenSet, AuthError>;
}

/// Standard OIDC provider backed by the shared discovery and JWKS caches.
pub struct OidcProvider {
    name: String,
    kind: ProviderKind,
    discovery: Arc<DiscoveryCache>,
    jwks: Arc<JwksCache>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl OidcProvider {
    pub fn new(
        config: &ProviderConfig,
        discovery: Arc<DiscoveryCache>,
        jwks: Arc<JwksCache>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            discovery,
            jwks,
            fetcher,
        }
    }
}

#[async_trait]
impl Provider for OidcProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate_id_token(
        &self,
        id_token: &str,
        access_token: Option<&str>,
        config: &ProviderConfig,
    ) -> Result<Claims, AuthError> {
        let doc = self.discovery.get(&config.issuer).await?;
        let raw = verify_id_token(
            &self.jwks,
            &doc.jwks_uri,
            id_token,
            &config.client_id,
            &doc.issuer,
        )
        .await?;
        let mut claims = Claims::from_id_token(raw, self.kind);

        if claims.email.is_empty() {
            if let (Some(token), Some(endpoint)) = (access_token, doc.userinfo_endpoint.as_deref())
            {
                match fetch_userinfo(self.fetcher.as_ref(), endpoint, token).await {
                    Ok(info) => claims.merge_userinfo(info),
                    Err(e) => tracing::warn!(provider = %self.name, "UserInfo fallback failed: {e}"),
                }
            }
        }

        Ok(claims)
    }

    async fn authorization_url(
        &self,
        config: &ProviderConfig,
        request: &AuthorizationRequest<'_>,
    ) -> Result<Url, AuthError> {
        let doc = self.discovery.get(&config.issuer).await?;

        let mut extra: Vec<(String, String)> = self
            .kind
            .default_auth_params()
            .iter()
            .filter(|(k, _)| !config.extra_auth_params.iter().any(|(ck, _)| ck.as_str() == *k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        extra.extend(config.extra_auth_params.iter().cloned());

        let scopes = if request.scopes.is_empty() {
            config.scopes.as_slice()
        } else {
            request.scopes
        };

        build_authorization_url(
            &doc.authorization_endpoint,
            &AuthorizationParams {
                client_id: &config.client_id,
                redirect_uri: request.redirect_uri,
                scopes,
                state: request.state,
                nonce: request.nonce,
                code_challenge: request.code_challenge,
                extra: &extra,
            },
        )
    }

    async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
        code_verifier: &SecretString,
        redirect_uri: &str,
    ) -> Result<TokenSet, AuthError> {
        let doc = self.discovery.get(&config.issuer).await?;
        exchange_code(
            self.fetcher.as_ref(),
            &doc.token_endpoint,
            &config.client_id,
            config.client_secret.as_ref().map(SecretString::expose),
            code,
            code_verifier.expose(),
            redirect_uri,
        )
        .await
    }
}
