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

//! PostgreSQL store. Schema lives in `migrations/0001_auth.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AuditStore, IdentityStore, SessionStore, StoreError, TokenStore, UnlinkOutcome, UserStore,
};
use crate::audit::AuditLog;
use crate::model::{ApiToken, Identity, OidcSession, Role, SessionCompletion, User};
use crate::secret::SecretString;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Option<Uuid>,
    provider: String,
    state: String,
    nonce: String,
    code_verifier: String,
    redirect_uri: String,
    return_to: Option<String>,
    scopes: Vec<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_refreshed: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl From<SessionRow> for OidcSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider,
            state: row.state,
            nonce: row.nonce,
            code_verifier: SecretString::from(row.code_verifier),
            redirect_uri: row.redirect_uri,
            return_to: row.return_to,
            scopes: row.scopes,
            expires_at: row.expires_at,
            created_at: row.created_at,
            last_refreshed: row.last_refreshed,
            completed_at: row.completed_at,
            id_token: row.id_token.map(SecretString::from),
            access_token: row.access_token.map(SecretString::from),
            refresh_token: row.refresh_token.map(SecretString::from),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
    role: String,
    active: bool,
    password_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| StoreError::Backend(format!("unknown role {:?}", row.role)))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            role,
            active: row.active,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    external_id: String,
    email: Option<String>,
    email_verified: bool,
    display_name: Option<String>,
    profile_picture_url: Option<String>,
    created_at: DateTime<Utc>,
    last_login_at: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider,
            external_id: row.external_id,
            email: row.email,
            email_verified: row.email_verified,
            display_name: row.display_name,
            profile_picture_url: row.profile_picture_url,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    device_name: String,
    scopes: Vec<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    last_used: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for ApiToken {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            device_name: row.device_name,
            scopes: row.scopes,
            expires_at: row.expires_at,
            created_at: row.created_at,
            created_by: row.created_by,
            last_used: row.last_used,
            revoked_at: row.revoked_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, provider, state, nonce, code_verifier, redirect_uri, \
     return_to, scopes, expires_at, created_at, last_refreshed, completed_at, id_token, \
     access_token, refresh_token";

const USER_COLUMNS: &str = "id, email, display_name, role, active, password_hash, created_at";

const IDENTITY_COLUMNS: &str = "id, user_id, provider, external_id, email, email_verified, \
     display_name, profile_picture_url, created_at, last_login_at";

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, device_name, scopes, expires_at, \
     created_at, created_by, last_used, revoked_at";

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: &OidcSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oidc_sessions
                (id, user_id, provider, state, nonce, code_verifier, redirect_uri, return_to,
                 scopes, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.provider)
        .bind(&session.state)
        .bind(&session.nonce)
        .bind(session.code_verifier.expose())
        .bind(&session.redirect_uri)
        .bind(session.return_to.as_deref())
        .bind(&session.scopes)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session_by_state(&self, state: &str) -> Result<Option<OidcSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM oidc_sessions WHERE state = $1"
        ))
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn complete_session(
        &self,
        id: Uuid,
        completion: &SessionCompletion,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE oidc_sessions
            SET user_id = $2, id_token = $3, access_token = $4, refresh_token = $5,
                completed_at = $6, last_refreshed = $6
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(completion.user_id)
        .bind(completion.id_token.as_ref().map(SecretString::expose))
        .bind(completion.access_token.as_ref().map(SecretString::expose))
        .bind(completion.refresh_token.as_ref().map(SecretString::expose))
        .bind(completion.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM oidc_sessions WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, role, active, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.password_hash.as_deref())
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO identities
                (id, user_id, provider, external_id, email, email_verified, display_name,
                 profile_picture_url, created_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.id)
        .bind(identity.user_id)
        .bind(&identity.provider)
        .bind(&identity.external_id)
        .bind(identity.email.as_deref())
        .bind(identity.email_verified)
        .bind(identity.display_name.as_deref())
        .bind(identity.profile_picture_url.as_deref())
        .bind(identity.created_at)
        .bind(identity.last_login_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_identity(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE provider = $1 AND external_id = $2"
        ))
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_identities_for_user(&self, user_id: Uuid) -> Result<Vec<Identity>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_identity_login(&self, identity: &Identity) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET email = $2, email_verified = $3, display_name = $4,
                profile_picture_url = $5, last_login_at = $6
            WHERE id = $1
            "#,
        )
        .bind(identity.id)
        .bind(identity.email.as_deref())
        .bind(identity.email_verified)
        .bind(identity.display_name.as_deref())
        .bind(identity.profile_picture_url.as_deref())
        .bind(identity.last_login_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_identity_keep_last(
        &self,
        user_id: Uuid,
        identity_id: Uuid,
    ) -> Result<UnlinkOutcome, StoreError> {
        // Concurrent unlinks for one user serialize on the user row lock.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM identities
            WHERE id = $1 AND user_id = $2
              AND (SELECT COUNT(*) FROM identities WHERE user_id = $2) > 1
            "#,
        )
        .bind(identity_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            tx.commit().await?;
            return Ok(UnlinkOutcome::Deleted);
        }

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM identities WHERE id = $1 AND user_id = $2")
                .bind(identity_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;

        Ok(if exists.is_some() {
            UnlinkOutcome::LastIdentity
        } else {
            UnlinkOutcome::NotFound
        })
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn create_token(&self, token: &ApiToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_tokens
                (id, user_id, token_hash, device_name, scopes, expires_at, created_at,
                 created_by, last_used, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.device_name)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.created_by)
        .bind(token.last_used)
        .bind(token.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_token(&self, id: Uuid) -> Result<Option<ApiToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<ApiToken>, StoreError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_active_tokens_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM api_tokens
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as usize)
    }

    async fn revoke_token(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE api_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE api_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_tokens SET last_used = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_tokens_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_tokens_revoked_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM api_tokens WHERE revoked_at IS NOT NULL AND revoked_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, user_id, action, resource, resource_id, ip_address, user_agent,
                 metadata, success, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.resource.as_str())
        .bind(entry.resource_id.as_deref())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(Json(&entry.metadata))
        .bind(entry.success)
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
