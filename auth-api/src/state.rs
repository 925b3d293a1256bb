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

//! Shared application state passed to every Axum handler via `State`.
//!
//! This is the composition root: caches, the provider registry and the
//! services are built here once and shared behind `Arc`s.

use std::sync::Arc;

use crate::audit::{AuditSink, StoreAuditSink};
use crate::clock::Clock;
use crate::config::Config;
use crate::db::{AuditStore, IdentityStore, SessionStore, TokenStore, UserStore};
use crate::error::AuthError;
use crate::http::HttpFetcher;
use crate::oidc::jwks::DEFAULT_FORCED_REFRESH_COOLDOWN;
use crate::oidc::{DiscoveryCache, JwksCache, ProviderRegistry};
use crate::policy::AllowlistPolicy;
use crate::service::{AuthService, IdentityService, TokenService};

/// Cookie and redirect settings used by the browser-facing routes.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub callback_url: String,
    pub after_login_url: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub session_ttl_secs: i64,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub identities: Arc<IdentityService>,
    pub tokens: Arc<TokenService>,
    pub web: Arc<WebSettings>,
}

impl AppState {
    /// Wire every service to `store`, which backs all five store traits.
    pub fn new<S>(
        store: Arc<S>,
        config: &Config,
        fetcher: Arc<dyn HttpFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError>
    where
        S: SessionStore + UserStore + IdentityStore + TokenStore + AuditStore + 'static,
    {
        let audit: Arc<dyn AuditSink> = Arc::new(StoreAuditSink::new(store.clone()));

        let discovery = Arc::new(DiscoveryCache::with_ttl(fetcher.clone(), config.discovery_ttl));
        let jwks = Arc::new(JwksCache::with_settings(
            fetcher.clone(),
            config.jwks_ttl,
            DEFAULT_FORCED_REFRESH_COOLDOWN,
        ));
        let registry = ProviderRegistry::from_configs(
            config.providers.clone(),
            discovery,
            jwks,
            fetcher,
        )?;
        if registry.is_empty() {
            tracing::warn!("no identity providers configured; login is disabled");
        }

        let identities = Arc::new(IdentityService::new(
            store.clone(),
            store.clone(),
            audit.clone(),
            clock.clone(),
            config.admin_emails.clone(),
        ));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            Arc::new(registry),
            identities.clone(),
            AllowlistPolicy::new(config.allowed_domains.clone(), config.allowed_users.clone()),
            audit.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenService::new(
            store.clone(),
            store,
            audit,
            clock,
            config.tokens.clone(),
        ));

        Ok(Self {
            auth,
            identities,
            tokens,
            web: Arc::new(WebSettings {
                callback_url: config.callback_url(),
                after_login_url: config.after_login_url.clone(),
                cookie_domain: config.cookie_domain.clone(),
                cookie_secure: config.cookie_secure,
                session_ttl_secs: config.web_session_ttl_secs,
            }),
        })
    }
}
