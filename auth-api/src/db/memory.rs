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

//! In-process store used by tests and local development.
//!
//! Everything lives behind one async mutex, so each trait method is atomic
//! with respect to every other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AuditStore, IdentityStore, SessionStore, StoreError, TokenStore, UnlinkOutcome, UserStore,
};
use crate::audit::AuditLog;
use crate::model::{ApiToken, Identity, OidcSession, SessionCompletion, User};

#[derive(Default)]
struct Tables {
    /// Keyed by `state`.
    sessions: HashMap<String, OidcSession>,
    users: HashMap<Uuid, User>,
    identities: HashMap<Uuid, Identity>,
    tokens: HashMap<Uuid, ApiToken>,
    audit: Vec<AuditLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLog> {
        self.tables.lock().await.audit.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }

    /// Enable or disable a user account. Returns `false` for unknown ids.
    pub async fn set_user_active(&self, id: Uuid, active: bool) -> bool {
        match self.tables.lock().await.users.get_mut(&id) {
            Some(user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &OidcSession) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t.sessions.contains_key(&session.state) {
            return Err(StoreError::Conflict("oidc_sessions.state".to_string()));
        }
        t.sessions.insert(session.state.clone(), session.clone());
        Ok(())
    }

    async fn get_session_by_state(&self, state: &str) -> Result<Option<OidcSession>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(state).cloned())
    }

    async fn complete_session(
        &self,
        id: Uuid,
        completion: &SessionCompletion,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(session) = t.sessions.values_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if session.completed_at.is_some() {
            return Ok(false);
        }
        session.user_id = Some(completion.user_id);
        session.id_token = completion.id_token.clone();
        session.access_token = completion.access_token.clone();
        session.refresh_token = completion.refresh_token.clone();
        session.completed_at = Some(completion.completed_at);
        session.last_refreshed = Some(completion.completed_at);
        Ok(true)
    }

    async fn delete_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.created_at >= cutoff);
        Ok((before - t.sessions.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict("users.email".to_string()));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        t.identities.retain(|_, i| i.user_id != id);
        t.tokens.retain(|_, tok| tok.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t.identities.values().any(|i| {
            i.provider == identity.provider && i.external_id == identity.external_id
        }) {
            return Err(StoreError::Conflict(
                "identities(provider, external_id)".to_string(),
            ));
        }
        t.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn get_identity(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .identities
            .values()
            .find(|i| i.provider == provider && i.external_id == external_id)
            .cloned())
    }

    async fn list_identities_for_user(&self, user_id: Uuid) -> Result<Vec<Identity>, StoreError> {
        let t = self.tables.lock().await;
        let mut out: Vec<Identity> = t
            .identities
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.created_at);
        Ok(out)
    }

    async fn update_identity_login(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        match t.identities.get_mut(&identity.id) {
            Some(existing) => {
                existing.email = identity.email.clone();
                existing.email_verified = identity.email_verified;
                existing.display_name = identity.display_name.clone();
                existing.profile_picture_url = identity.profile_picture_url.clone();
                existing.last_login_at = identity.last_login_at;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_identity_keep_last(
        &self,
        user_id: Uuid,
        identity_id: Uuid,
    ) -> Result<UnlinkOutcome, StoreError> {
        let mut t = self.tables.lock().await;
        match t.identities.get(&identity_id) {
            Some(i) if i.user_id == user_id => {}
            _ => return Ok(UnlinkOutcome::NotFound),
        }
        let owned = t
            .identities
            .values()
            .filter(|i| i.user_id == user_id)
            .count();
        if owned <= 1 {
            return Ok(UnlinkOutcome::LastIdentity);
        }
        t.identities.remove(&identity_id);
        Ok(UnlinkOutcome::Deleted)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create_token(&self, token: &ApiToken) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t.tokens.values().any(|x| x.token_hash == token.token_hash) {
            return Err(StoreError::Conflict("api_tokens.token_hash".to_string()));
        }
        t.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn get_token(&self, id: Uuid) -> Result<Option<ApiToken>, StoreError> {
        Ok(self.tables.lock().await.tokens.get(&id).cloned())
    }

    async fn list_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<ApiToken>, StoreError> {
        let t = self.tables.lock().await;
        let mut out: Vec<ApiToken> = t
            .tokens
            .values()
            .filter(|x| x.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn count_active_tokens_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .tokens
            .values()
            .filter(|x| x.user_id == user_id && x.is_valid(now))
            .count())
    }

    async fn revoke_token(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        match t.tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let mut n = 0;
        for token in t.tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(at);
                n += 1;
            }
        }
        Ok(n)
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        match t.tokens.get_mut(&id) {
            Some(token) => {
                token.last_used = Some(at);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.tokens.len();
        t.tokens.retain(|_, x| x.expires_at >= cutoff);
        Ok((before - t.tokens.len()) as u64)
    }

    async fn delete_tokens_revoked_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.tokens.len();
        t.tokens
            .retain(|_, x| x.revoked_at.map_or(true, |at| at >= cutoff));
        Ok((before - t.tokens.len()) as u64)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError> {
        self.tables.lock().await.audit.push(entry.clone());
        Ok(())
    }
}
