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

//! PKCE authorization-code flow.
//!
//! A session is PENDING from `start_oidc_flow` until `complete_oidc_flow`
//! sets `completed_at`. The transition is a conditional store update, so two
//! callbacks racing on one `state` cannot both succeed. A session is dead
//! once `expires_at` passes, completed or not.

use std::sync::Arc;

use chrono::Duration;
use url::Url;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, AuditResource, AuditSink, ClientInfo};
use crate::clock::Clock;
use crate::db::SessionStore;
use crate::error::AuthError;
use crate::model::{FlowState, OidcSession, SessionCompletion, User};
use crate::oidc::{pkce, AuthorizationRequest, ProviderRegistry, TokenSet};
use crate::policy::AllowlistPolicy;
use crate::secret::random_urlsafe;

use super::identity::IdentityService;

/// Absolute lifetime of a login attempt in seconds, measured from creation.
pub const SESSION_TTL_SECS: i64 = 30 * 60;

/// A freshly persisted session and where to send the browser.
#[derive(Debug)]
pub struct StartedFlow {
    pub session: OidcSession,
    pub authorization_url: Url,
}

/// Result of a successful callback.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub session: OidcSession,
}

pub struct AuthService {
    sessions: Arc<dyn SessionStore>,
    registry: Arc<ProviderRegistry>,
    identities: Arc<IdentityService>,
    policy: AllowlistPolicy,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        registry: Arc<ProviderRegistry>,
        identities: Arc<IdentityService>,
        policy: AllowlistPolicy,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            registry,
            identities,
            policy,
            audit,
            clock,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Persist a new PENDING session for `provider` and build its
    /// authorization URL. `state`, `nonce` and the PKCE verifier are three
    /// independent CSPRNG draws.
    pub async fn start_oidc_flow(
        &self,
        provider: &str,
        redirect_uri: &str,
        scopes: &[String],
        return_to: Option<String>,
        client: &ClientInfo,
    ) -> Result<StartedFlow, AuthError> {
        let registered = self.registry.get(provider)?;
        let now = self.clock.now();

        let session = OidcSession {
            id: Uuid::new_v4(),
            user_id: None,
            provider: registered.config.name.clone(),
            state: random_urlsafe(),
            nonce: random_urlsafe(),
            code_verifier: pkce::new_verifier(),
            redirect_uri: redirect_uri.to_string(),
            return_to,
            scopes: if scopes.is_empty() {
                registered.config.scopes.clone()
            } else {
                scopes.to_vec()
            },
            expires_at: now + Duration::seconds(SESSION_TTL_SECS),
            created_at: now,
            last_refreshed: None,
            completed_at: None,
            id_token: None,
            access_token: None,
            refresh_token: None,
        };

        let authorization_url = registered
            .provider
            .authorization_url(
                &registered.config,
                &AuthorizationRequest {
                    redirect_uri,
                    state: &session.state,
                    nonce: &session.nonce,
                    code_challenge: &pkce::challenge(&session.code_verifier),
                    scopes: &session.scopes,
                },
            )
            .await?;

        self.sessions.create_session(&session).await?;

        self.audit
            .record(
                AuditLog::new(AuditAction::OidcStarted, AuditResource::Session, now)
                    .resource_id(session.id)
                    .client(client)
                    .meta("provider", &session.provider),
            )
            .await;
        tracing::debug!(provider = %session.provider, session_id = %session.id, "OIDC flow started");

        Ok(StartedFlow {
            session,
            authorization_url,
        })
    }

    /// Look up a PENDING session by `state`, auditing every way it can fail.
    async fn pending_session(
        &self,
        state: &str,
        client: &ClientInfo,
    ) -> Result<OidcSession, AuthError> {
        let now = self.clock.now();
        let failed = |reason: &str| {
            AuditLog::new(AuditAction::OidcFailed, AuditResource::Session, now)
                .client(client)
                .failed(reason)
        };

        let Some(session) = self.sessions.get_session_by_state(state).await? else {
            self.audit.record(failed("invalid_state")).await;
            return Err(AuthError::InvalidState);
        };

        match session.flow_state(now) {
            FlowState::Pending => Ok(session),
            FlowState::Expired => {
                self.audit
                    .record(failed("expired").resource_id(session.id))
                    .await;
                Err(AuthError::SessionExpired)
            }
            FlowState::Completed => {
                self.audit
                    .record(
                        failed("replay")
                            .resource_id(session.id)
                            .user(session.user_id),
                    )
                    .await;
                Err(AuthError::AlreadyCompleted)
            }
        }
    }

    /// Transition the session behind `state` to COMPLETED and bind the user
    /// and provider tokens to it.
    pub async fn complete_oidc_flow(
        &self,
        state: &str,
        user_id: Uuid,
        tokens: &TokenSet,
        client: &ClientInfo,
    ) -> Result<OidcSession, AuthError> {
        let mut session = self.pending_session(state, client).await?;
        let now = self.clock.now();

        let completion = SessionCompletion {
            user_id,
            id_token: tokens.id_token.clone(),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            completed_at: now,
        };

        if !self.sessions.complete_session(session.id, &completion).await? {
            self.audit
                .record(
                    AuditLog::new(AuditAction::OidcFailed, AuditResource::Session, now)
                        .resource_id(session.id)
                        .client(client)
                        .failed("replay"),
                )
                .await;
            return Err(AuthError::AlreadyCompleted);
        }

        session.user_id = Some(user_id);
        session.id_token = completion.id_token;
        session.access_token = completion.access_token;
        session.refresh_token = completion.refresh_token;
        session.completed_at = Some(now);
        session.last_refreshed = Some(now);

        self.audit
            .record(
                AuditLog::new(AuditAction::OidcCompleted, AuditResource::Session, now)
                    .user(Some(user_id))
                    .resource_id(session.id)
                    .client(client)
                    .meta("provider", &session.provider),
            )
            .await;

        Ok(session)
    }

    /// Run the provider callback: exchange the code, validate the ID token
    /// against the session, apply the allowlist, resolve the local user and
    /// complete the session.
    pub async fn finish_login(
        &self,
        state: &str,
        code: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let session = self.pending_session(state, client).await?;

        match self.authenticate(&session, code, client).await {
            Ok((user, tokens)) => {
                let session = self
                    .complete_oidc_flow(state, user.id, &tokens, client)
                    .await?;
                tracing::info!(user_id = %user.id, provider = %session.provider, "login completed");
                Ok(LoginOutcome { user, session })
            }
            Err((reason, err)) => {
                self.audit
                    .record(
                        AuditLog::new(
                            AuditAction::OidcFailed,
                            AuditResource::Session,
                            self.clock.now(),
                        )
                        .resource_id(session.id)
                        .client(client)
                        .meta("provider", &session.provider)
                        .failed(reason),
                    )
                    .await;
                tracing::info!(provider = %session.provider, reason, "login rejected");
                Err(err)
            }
        }
    }

    /// Everything between a valid PENDING session and completion. Failures
    /// carry the audit reason.
    async fn authenticate(
        &self,
        session: &OidcSession,
        code: &str,
        client: &ClientInfo,
    ) -> Result<(User, TokenSet), (&'static str, AuthError)> {
        let registered = self
            .registry
            .get(&session.provider)
            .map_err(|e| ("unknown_provider", e))?;
        let provider = &registered.provider;
        let config = &registered.config;

        let tokens = provider
            .exchange_code(config, code, &session.code_verifier, &session.redirect_uri)
            .await
            .map_err(|e| ("exchange_failed", e))?;

        let id_token = tokens.id_token.as_ref().ok_or((
            "invalid_token",
            AuthError::TokenVerification("token response has no id_token".into()),
        ))?;

        let claims = provider
            .validate_id_token(
                id_token.expose(),
                Some(tokens.access_token.expose()),
                config,
            )
            .await
            .map_err(|e| ("invalid_token", e))?;

        if claims.nonce.as_deref() != Some(session.nonce.as_str()) {
            return Err(("nonce_mismatch", AuthError::NonceMismatch));
        }

        claims
            .check(self.clock.now())
            .map_err(|e| ("invalid_claims", e))?;

        if !self
            .policy
            .is_user_allowed(&claims.email, claims.hosted_domain.as_deref())
        {
            return Err(("not_allowed", AuthError::NotAllowed));
        }

        let user = self
            .identities
            .resolve(&session.provider, &claims, client)
            .await
            .map_err(|e| match e {
                AuthError::InvalidClaims(_) => ("invalid_claims", e),
                _ => ("identity_failed", e),
            })?;

        if !user.active {
            return Err(("inactive_user", AuthError::InactiveUser));
        }

        Ok((user, tokens))
    }

    /// Delete sessions created more than `older_than` ago.
    pub async fn cleanup_expired_sessions(&self, older_than: Duration) -> Result<u64, AuthError> {
        let now = self.clock.now();
        let deleted = self
            .sessions
            .delete_sessions_created_before(now - older_than)
            .await?;
        if deleted > 0 {
            self.audit
                .record(
                    AuditLog::new(AuditAction::OidcCleanup, AuditResource::Session, now)
                        .meta("deleted", deleted),
                )
                .await;
            tracing::info!(deleted, "removed expired OIDC sessions");
        }
        Ok(deleted)
    }
}
