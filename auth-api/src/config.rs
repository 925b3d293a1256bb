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

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::http::DEFAULT_HTTP_TIMEOUT;
use crate::oidc::discovery::DEFAULT_DISCOVERY_TTL;
use crate::oidc::jwks::DEFAULT_JWKS_TTL;
use crate::oidc::{ProviderConfig, ProviderKind};
use crate::secret::SecretString;
use crate::service::TokenSettings;

/// Upper bound for every configured duration (ten years).
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the auth service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server (e.g. "0.0.0.0:8082").
    pub listen_addr: String,
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Externally visible base URL; the OIDC callback is `{base}/auth/callback`.
    pub public_base_url: String,
    /// Where the browser lands after login when no `returnTo` was given.
    pub after_login_url: String,
    /// Cookie domain (optional, e.g. ".example.com").
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub providers: Vec<ProviderConfig>,
    pub allowed_domains: Vec<String>,
    pub allowed_users: Vec<String>,
    /// Users created with one of these emails get the admin role.
    pub admin_emails: Vec<String>,
    pub tokens: TokenSettings,
    /// Lifetime of the token issued into the `session` cookie.
    pub web_session_ttl_secs: i64,
    pub http_timeout: Duration,
    pub discovery_ttl: Duration,
    pub jwks_ttl: Duration,
    pub cleanup_interval: Duration,
    pub session_retention_secs: i64,
    pub revoked_token_retention_secs: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Required
    /// - `DATABASE_URL`
    /// - `OIDC_<NAME>_ISSUER` and `OIDC_<NAME>_CLIENT_ID` for every name in
    ///   `OIDC_PROVIDERS`
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url =
            var("DATABASE_URL").ok_or("DATABASE_URL environment variable is required")?;
        let listen_addr = var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8082".to_string());
        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8082".to_string())
            .trim_end_matches('/')
            .to_string();
        let after_login_url = var("AFTER_LOGIN_URL").unwrap_or_else(|| "/".to_string());
        let cookie_domain = var("COOKIE_DOMAIN");
        let cookie_secure = parse_or(&var, "COOKIE_SECURE", true)?;

        let mut providers = Vec::new();
        for name in list(var("OIDC_PROVIDERS")) {
            providers.push(provider_from_env(&var, &name)?);
        }

        let defaults = TokenSettings::default();
        let tokens = TokenSettings {
            prefix: var("API_TOKEN_PREFIX").unwrap_or(defaults.prefix),
            default_ttl: chrono::Duration::seconds(positive_secs(
                &var,
                "API_TOKEN_DEFAULT_TTL_SECS",
                defaults.default_ttl.num_seconds(),
            )?),
            max_ttl: chrono::Duration::seconds(positive_secs(
                &var,
                "API_TOKEN_MAX_TTL_SECS",
                defaults.max_ttl.num_seconds(),
            )?),
            max_per_user: parse_or(&var, "API_TOKEN_MAX_PER_USER", defaults.max_per_user)?,
        };
        if tokens.prefix.contains('_') {
            return Err("API_TOKEN_PREFIX must not contain '_'".to_string());
        }
        if tokens.max_ttl < tokens.default_ttl {
            return Err(
                "API_TOKEN_DEFAULT_TTL_SECS must not exceed API_TOKEN_MAX_TTL_SECS".to_string(),
            );
        }

        Ok(Self {
            listen_addr,
            database_url,
            public_base_url,
            after_login_url,
            cookie_domain,
            cookie_secure,
            providers,
            allowed_domains: list(var("AUTH_ALLOWED_DOMAINS")),
            allowed_users: list(var("AUTH_ALLOWED_USERS")),
            admin_emails: list(var("AUTH_ADMIN_EMAILS")),
            tokens,
            web_session_ttl_secs: positive_secs(
                &var,
                "WEB_SESSION_TTL_SECS",
                7 * 24 * 60 * 60,
            )?,
            http_timeout: secs_or(&var, "OIDC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?,
            discovery_ttl: secs_or(&var, "OIDC_DISCOVERY_TTL_SECS", DEFAULT_DISCOVERY_TTL)?,
            jwks_ttl: secs_or(&var, "OIDC_JWKS_TTL_SECS", DEFAULT_JWKS_TTL)?,
            cleanup_interval: secs_or(&var, "CLEANUP_INTERVAL_SECS", Duration::from_secs(3600))?,
            session_retention_secs: positive_secs(
                &var,
                "SESSION_RETENTION_SECS",
                24 * 60 * 60,
            )?,
            revoked_token_retention_secs: positive_secs(
                &var,
                "REVOKED_TOKEN_RETENTION_SECS",
                30 * 24 * 60 * 60,
            )?,
        })
    }

    /// Redirect URI registered with every provider.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.public_base_url)
    }
}

fn provider_from_env(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<ProviderConfig, String> {
    let key = |suffix: &str| format!("OIDC_{}_{suffix}", name.to_ascii_uppercase());

    let issuer = var(&key("ISSUER")).ok_or_else(|| format!("{} is required", key("ISSUER")))?;
    let client_id =
        var(&key("CLIENT_ID")).ok_or_else(|| format!("{} is required", key("CLIENT_ID")))?;

    let mut config = ProviderConfig::new(name, &issuer, &client_id);
    config.client_secret = var(&key("CLIENT_SECRET")).map(SecretString::new);
    if let Some(kind) = var(&key("KIND")) {
        config.kind = ProviderKind::parse(&kind)
            .ok_or_else(|| format!("{} has unknown value {kind:?}", key("KIND")))?;
    }
    if let Some(scopes) = var(&key("SCOPES")) {
        config.scopes = scopes
            .split([',', ' '])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    for pair in list(var(&key("AUTH_PARAMS"))) {
        let (k, v) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| format!("{} entry {pair:?} is not key=value", key("AUTH_PARAMS")))?;
        config
            .extra_auth_params
            .push((k.trim().to_string(), v.trim().to_string()));
    }
    Ok(config)
}

/// Comma-separated list, empty entries dropped.
fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match var(key) {
        Some(v) => v
            .parse()
            .map_err(|_| format!("{key} has invalid value {v:?}")),
        None => Ok(default),
    }
}

/// Whole seconds in `1..=MAX_DURATION_SECS`.
fn positive_secs(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, String> {
    let secs = parse_or(var, key, default)?;
    if !(1..=MAX_DURATION_SECS).contains(&secs) {
        return Err(format!(
            "{key} must be between 1 and {MAX_DURATION_SECS} seconds, got {secs}"
        ));
    }
    Ok(secs)
}

fn secs_or(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, String> {
    let default = i64::try_from(default.as_secs()).unwrap_or(MAX_DURATION_SECS);
    positive_secs(var, key, default).map(|secs| Duration::from_secs(secs.unsigned_abs()))
}
