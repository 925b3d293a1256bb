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

//! Maps validated provider claims to a local user and linked identity.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog, AuditResource, AuditSink, ClientInfo};
use crate::clock::Clock;
use crate::db::{IdentityStore, StoreError, UnlinkOutcome, UserStore};
use crate::error::AuthError;
use crate::model::{Identity, Role, User};
use crate::oidc::Claims;

pub struct IdentityService {
    users: Arc<dyn UserStore>,
    identities: Arc<dyn IdentityStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    admin_emails: Vec<String>,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserStore>,
        identities: Arc<dyn IdentityStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        admin_emails: Vec<String>,
    ) -> Self {
        Self {
            users,
            identities,
            audit,
            clock,
            admin_emails: admin_emails
                .into_iter()
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    fn role_for(&self, email: &str) -> Role {
        if self.admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email)) {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Find or create the user behind `(provider, claims.subject)`.
    ///
    /// A new identity is attached to an existing user only when the provider
    /// vouches for the email (`email_verified`). Otherwise a new user is
    /// created; an unverified email that collides with an existing account
    /// is rejected.
    pub async fn resolve(
        &self,
        provider: &str,
        claims: &Claims,
        client: &ClientInfo,
    ) -> Result<User, AuthError> {
        let now = self.clock.now();

        if let Some(mut identity) = self.identities.get_identity(provider, &claims.subject).await? {
            let user = self
                .users
                .get_user(identity.user_id)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            identity.email = Some(claims.email.clone());
            identity.email_verified = claims.email_verified;
            identity.display_name = Some(claims.name.clone());
            identity.profile_picture_url = claims.picture.clone();
            identity.last_login_at = now;
            self.identities.update_identity_login(&identity).await?;
            return Ok(user);
        }

        let (user, created) = match self.users.get_user_by_email(&claims.email).await? {
            Some(user) if claims.email_verified => (user, false),
            Some(_) => {
                return Err(AuthError::InvalidClaims(
                    "email belongs to an existing account but is not verified".into(),
                ))
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: claims.email.clone(),
                    display_name: claims.name.clone(),
                    role: self.role_for(&claims.email),
                    active: true,
                    password_hash: None,
                    created_at: now,
                };
                self.users.create_user(&user).await?;
                tracing::info!(user_id = %user.id, role = user.role.as_str(), "created user on first login");
                (user, true)
            }
        };

        let identity = Identity {
            id: Uuid::new_v4(),
            user_id: user.id,
            provider: provider.to_string(),
            external_id: claims.subject.clone(),
            email: Some(claims.email.clone()),
            email_verified: claims.email_verified,
            display_name: Some(claims.name.clone()),
            profile_picture_url: claims.picture.clone(),
            created_at: now,
            last_login_at: now,
        };

        match self.identities.create_identity(&identity).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                // A concurrent first login for the same subject won.
                if created {
                    if let Err(e) = self.users.delete_user(user.id).await {
                        tracing::warn!(
                            user_id = %user.id,
                            "failed to remove user left without an identity: {e}"
                        );
                    }
                }
                let existing = self
                    .identities
                    .get_identity(provider, &claims.subject)
                    .await?
                    .ok_or(AuthError::IdentityNotFound)?;
                return self
                    .users
                    .get_user(existing.user_id)
                    .await?
                    .ok_or(AuthError::UserNotFound);
            }
            Err(e) => return Err(e.into()),
        }

        self.audit
            .record(
                AuditLog::new(AuditAction::IdentityLinked, AuditResource::Identity, now)
                    .user(Some(user.id))
                    .resource_id(identity.id)
                    .client(client)
                    .meta("provider", provider),
            )
            .await;

        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .get_user(user_id)
            .await?
            .map(User::redacted)
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Identity>, AuthError> {
        Ok(self.identities.list_identities_for_user(user_id).await?)
    }

    /// Remove one of the user's identities; the last one is always kept.
    pub async fn unlink(
        &self,
        user_id: Uuid,
        identity_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let outcome = self
            .identities
            .delete_identity_keep_last(user_id, identity_id)
            .await?;

        let entry = AuditLog::new(
            AuditAction::IdentityUnlinked,
            AuditResource::Identity,
            self.clock.now(),
        )
        .user(Some(user_id))
        .resource_id(identity_id)
        .client(client);

        match outcome {
            UnlinkOutcome::Deleted => {
                self.audit.record(entry).await;
                Ok(())
            }
            UnlinkOutcome::LastIdentity => {
                self.audit.record(entry.failed("last_identity")).await;
                Err(AuthError::LastIdentity)
            }
            UnlinkOutcome::NotFound => {
                self.audit.record(entry.failed("not_found")).await;
                Err(AuthError::IdentityNotFound)
            }
        }
    }
}
