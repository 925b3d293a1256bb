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

//! Persistence traits consumed by the services, plus two implementations:
//! [`memory::MemoryStore`] and [`postgres::PgStore`].
//!
//! Methods that guard an invariant under concurrency (`complete_session`,
//! `revoke_token`, `delete_identity_keep_last`) are single conditional
//! updates in every implementation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::model::{ApiToken, Identity, OidcSession, SessionCompletion, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Outcome of unlinking an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkOutcome {
    Deleted,
    /// The identity is the user's only one and was kept.
    LastIdentity,
    NotFound,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &OidcSession) -> Result<(), StoreError>;

    async fn get_session_by_state(&self, state: &str) -> Result<Option<OidcSession>, StoreError>;

    /// Transition to COMPLETED only if not completed yet. Returns `false` when
    /// another caller completed it first (or the session vanished).
    async fn complete_session(
        &self,
        id: Uuid,
        completion: &SessionCompletion,
    ) -> Result<bool, StoreError>;

    /// Delete sessions created before `cutoff`; returns the number removed.
    async fn delete_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Remove a user together with anything that references it.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if `(provider, external_id)` exists.
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn get_identity(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Identity>, StoreError>;

    async fn list_identities_for_user(&self, user_id: Uuid) -> Result<Vec<Identity>, StoreError>;

    /// Refresh profile fields and `last_login_at` after a successful login.
    async fn update_identity_login(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Delete the identity unless it is the user's last one.
    async fn delete_identity_keep_last(
        &self,
        user_id: Uuid,
        identity_id: Uuid,
    ) -> Result<UnlinkOutcome, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_token(&self, token: &ApiToken) -> Result<(), StoreError>;

    async fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, StoreError>;

    async fn get_token(&self, id: Uuid) -> Result<Option<ApiToken>, StoreError>;

    async fn list_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<ApiToken>, StoreError>;

    async fn count_active_tokens_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Set `revoked_at` if unset. Returns `true` when this call revoked it.
    async fn revoke_token(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Revoke every unrevoked token of the user; returns how many changed.
    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, StoreError>;

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete_tokens_expired_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, StoreError>;

    async fn delete_tokens_revoked_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError>;
}
