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

//! API token lifecycle: issue, validate, revoke and clean up.
//!
//! Plaintext tokens look like `<prefix>_<base64url(32 random bytes)>`. Only
//! `base64url(SHA-256(plaintext))` is stored, so a token can be checked but
//! never recovered.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, AuditResource, AuditSink, ClientInfo};
use crate::clock::Clock;
use crate::db::{TokenStore, UserStore};
use crate::error::AuthError;
use crate::model::{ApiToken, IssuedToken, PlaintextToken, User};
use crate::scope;
use crate::secret::{random_urlsafe, sha256_urlsafe};

pub const DEFAULT_TOKEN_PREFIX: &str = "ak";
const MAX_DEVICE_NAME_LEN: usize = 100;
const WEB_SESSION_DEVICE: &str = "web";

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub prefix: String,
    pub default_ttl: Duration,
    pub max_ttl: Duration,
    pub max_per_user: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            default_ttl: Duration::days(30),
            max_ttl: Duration::days(90),
            max_per_user: 25,
        }
    }
}

/// A token that passed validation and the (redacted) user it belongs to.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub user: User,
    pub token: ApiToken,
}

pub struct TokenService {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            tokens,
            users,
            audit,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    fn entry(&self, action: AuditAction, client: &ClientInfo) -> AuditLog {
        AuditLog::new(action, AuditResource::Token, self.clock.now()).client(client)
    }

    /// Issue a new token for `user_id`. The plaintext in the returned
    /// [`IssuedToken`] is the only copy that will ever exist.
    pub async fn create(
        &self,
        user_id: Uuid,
        device_name: &str,
        scopes: Vec<String>,
        expires_in: Option<Duration>,
        created_by: Uuid,
        client: &ClientInfo,
    ) -> Result<IssuedToken, AuthError> {
        let failed = |reason: &str| {
            self.entry(AuditAction::TokenCreated, client)
                .user(Some(user_id))
                .failed(reason)
        };

        let Some(user) = self.users.get_user(user_id).await? else {
            self.audit.record(failed("user_not_found")).await;
            return Err(AuthError::UserNotFound);
        };
        if !user.active {
            self.audit.record(failed("inactive_user")).await;
            return Err(AuthError::InactiveUser);
        }

        let device_name = device_name.trim();
        if device_name.is_empty() || device_name.chars().count() > MAX_DEVICE_NAME_LEN {
            self.audit.record(failed("invalid_device_name")).await;
            return Err(AuthError::InvalidRequest(format!(
                "device name must be 1 to {MAX_DEVICE_NAME_LEN} characters"
            )));
        }

        let mut scopes = if scopes.is_empty() {
            scope::allowed_for(user.role)
        } else {
            scopes
        };
        scopes.sort();
        scopes.dedup();
        if let Some(bad) = scope::first_disallowed(user.role, &scopes) {
            let bad = bad.to_string();
            self.audit
                .record(failed("scope_not_allowed").meta("scope", &bad))
                .await;
            return Err(AuthError::ScopeNotAllowed(bad));
        }

        let ttl = match expires_in {
            None => self.settings.default_ttl,
            Some(ttl) if ttl <= Duration::zero() => {
                self.audit.record(failed("invalid_expiry")).await;
                return Err(AuthError::InvalidRequest(
                    "expiry must be positive".to_string(),
                ));
            }
            Some(ttl) => ttl.min(self.settings.max_ttl),
        };

        let active = self
            .tokens
            .count_active_tokens_for_user(user_id, self.clock.now())
            .await?;
        if active >= self.settings.max_per_user {
            self.audit.record(failed("too_many_tokens")).await;
            return Err(AuthError::TooManyTokens(self.settings.max_per_user));
        }

        self.issue(user_id, device_name, scopes, ttl, created_by, client)
            .await
    }

    /// Token for the browser `session` cookie after a federated login. It
    /// carries every scope the role allows and is not subject to the per-user
    /// cap, so repeated logins cannot lock a user out.
    pub async fn issue_web_session(
        &self,
        user: &User,
        ttl: Duration,
        client: &ClientInfo,
    ) -> Result<IssuedToken, AuthError> {
        if !user.active {
            return Err(AuthError::InactiveUser);
        }
        self.issue(
            user.id,
            WEB_SESSION_DEVICE,
            scope::allowed_for(user.role),
            ttl.min(self.settings.max_ttl),
            user.id,
            client,
        )
        .await
    }

    async fn issue(
        &self,
        user_id: Uuid,
        device_name: &str,
        scopes: Vec<String>,
        ttl: Duration,
        created_by: Uuid,
        client: &ClientInfo,
    ) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let plaintext = format!("{}_{}", self.settings.prefix, random_urlsafe());
        let token = ApiToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: sha256_urlsafe(&plaintext),
            device_name: device_name.to_string(),
            scopes,
            expires_at: now + ttl,
            created_at: now,
            created_by,
            last_used: None,
            revoked_at: None,
        };
        self.tokens.create_token(&token).await?;

        self.audit
            .record(
                self.entry(AuditAction::TokenCreated, client)
                    .user(Some(user_id))
                    .resource_id(token.id)
                    .meta("device_name", &token.device_name)
                    .meta("scopes", token.scopes.join(" "))
                    .meta("created_by", created_by),
            )
            .await;
        tracing::info!(user_id = %user_id, token_id = %token.id, "issued API token");

        Ok(IssuedToken {
            token,
            plaintext: PlaintextToken::new(plaintext),
        })
    }

    /// Resolve a presented plaintext token to its user, optionally requiring
    /// a scope. Unknown and malformed tokens are rejected without an audit
    /// entry since there is no token to attribute the attempt to.
    pub async fn validate(
        &self,
        plaintext: &str,
        required_scope: Option<&str>,
        client: &ClientInfo,
    ) -> Result<ValidatedToken, AuthError> {
        let well_formed = plaintext
            .strip_prefix(self.settings.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|secret| !secret.is_empty());
        if !well_formed {
            return Err(AuthError::InvalidToken);
        }

        let Some(token) = self
            .tokens
            .get_token_by_hash(&sha256_urlsafe(plaintext))
            .await?
        else {
            return Err(AuthError::InvalidToken);
        };

        let now = self.clock.now();
        let used = || {
            self.entry(AuditAction::TokenUsed, client)
                .user(Some(token.user_id))
                .resource_id(token.id)
        };

        if !token.is_valid(now) {
            let reason = if token.is_revoked() { "revoked" } else { "expired" };
            self.audit.record(used().failed(reason)).await;
            return Err(AuthError::InvalidToken);
        }

        if let Some(required) = required_scope {
            if !token.has_scope(required) {
                self.audit
                    .record(used().meta("scope", required).failed("insufficient_scope"))
                    .await;
                return Err(AuthError::InsufficientScope(required.to_string()));
            }
        }

        let user = match self.users.get_user(token.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.audit.record(used().failed("user_not_found")).await;
                return Err(AuthError::UserNotFound);
            }
            Err(e) => {
                self.audit.record(used().failed("user_lookup_failed")).await;
                return Err(e.into());
            }
        };
        if !user.active {
            self.audit.record(used().failed("inactive_user")).await;
            return Err(AuthError::InactiveUser);
        }

        if let Err(e) = self.tokens.update_last_used(token.id, now).await {
            tracing::warn!(token_id = %token.id, "failed to record token use: {e}");
        }

        let mut entry = used();
        if let Some(required) = required_scope {
            entry = entry.meta("scope", required);
        }
        self.audit.record(entry).await;

        Ok(ValidatedToken {
            user: user.redacted(),
            token: ApiToken {
                last_used: Some(now),
                ..token
            },
        })
    }

    /// Revoke one token. Non-admins may only revoke their own; a foreign id
    /// looks exactly like an unknown one. Revoking twice succeeds.
    pub async fn revoke(
        &self,
        token_id: Uuid,
        acting: &User,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let entry = self
            .entry(AuditAction::TokenRevoked, client)
            .user(Some(acting.id))
            .resource_id(token_id);

        let token = match self.tokens.get_token(token_id).await? {
            Some(token) if token.user_id == acting.id || acting.is_admin() => token,
            _ => {
                self.audit.record(entry.failed("not_found")).await;
                return Err(AuthError::InvalidToken);
            }
        };

        let changed = self.tokens.revoke_token(token.id, self.clock.now()).await?;
        self.audit
            .record(
                entry
                    .meta("owner", token.user_id)
                    .meta("already_revoked", !changed),
            )
            .await;
        if changed {
            tracing::info!(token_id = %token.id, revoked_by = %acting.id, "revoked API token");
        }
        Ok(())
    }

    /// Revoke every live token of `user_id`. Returns how many changed.
    pub async fn revoke_all(&self, user_id: Uuid, client: &ClientInfo) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;
        self.audit
            .record(
                self.entry(AuditAction::TokenRevokedAll, client)
                    .user(Some(user_id))
                    .meta("revoked", revoked),
            )
            .await;
        tracing::info!(user_id = %user_id, revoked, "revoked all API tokens");
        Ok(revoked)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiToken>, AuthError> {
        Ok(self.tokens.list_tokens_for_user(user_id).await?)
    }

    /// Hard-delete tokens that expired more than `older_than` ago.
    pub async fn cleanup_expired_tokens(&self, older_than: Duration) -> Result<u64, AuthError> {
        let deleted = self
            .tokens
            .delete_tokens_expired_before(self.clock.now() - older_than)
            .await?;
        self.audit_cleanup("expired", deleted).await;
        Ok(deleted)
    }

    /// Hard-delete tokens revoked more than `older_than` ago.
    pub async fn cleanup_revoked_tokens(&self, older_than: Duration) -> Result<u64, AuthError> {
        let deleted = self
            .tokens
            .delete_tokens_revoked_before(self.clock.now() - older_than)
            .await?;
        self.audit_cleanup("revoked", deleted).await;
        Ok(deleted)
    }

    async fn audit_cleanup(&self, kind: &str, deleted: u64) {
        if deleted == 0 {
            return;
        }
        self.audit
            .record(
                AuditLog::new(AuditAction::TokenCleanup, AuditResource::Token, self.clock.now())
                    .meta("kind", kind)
                    .meta("deleted", deleted),
            )
            .await;
        tracing::info!(kind, deleted, "removed API tokens past retention");
    }
}
