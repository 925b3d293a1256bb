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

//! Append-only security audit trail.
//!
//! [`AuditSink::record`] has no error return: a slow or failing audit store
//! must never change the outcome of a login or token check. Failures are
//! logged and counted instead.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::AuditStore;

/// Default bound on a single audit write.
pub const DEFAULT_AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "oidc.started")]
    OidcStarted,
    #[serde(rename = "oidc.completed")]
    OidcCompleted,
    #[serde(rename = "oidc.failed")]
    OidcFailed,
    #[serde(rename = "oidc.cleanup")]
    OidcCleanup,
    #[serde(rename = "token.created")]
    TokenCreated,
    #[serde(rename = "token.used")]
    TokenUsed,
    #[serde(rename = "token.revoked")]
    TokenRevoked,
    #[serde(rename = "token.revoked_all")]
    TokenRevokedAll,
    #[serde(rename = "token.cleanup")]
    TokenCleanup,
    #[serde(rename = "identity.linked")]
    IdentityLinked,
    #[serde(rename = "identity.unlinked")]
    IdentityUnlinked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OidcStarted => "oidc.started",
            AuditAction::OidcCompleted => "oidc.completed",
            AuditAction::OidcFailed => "oidc.failed",
            AuditAction::OidcCleanup => "oidc.cleanup",
            AuditAction::TokenCreated => "token.created",
            AuditAction::TokenUsed => "token.used",
            AuditAction::TokenRevoked => "token.revoked",
            AuditAction::TokenRevokedAll => "token.revoked_all",
            AuditAction::TokenCleanup => "token.cleanup",
            AuditAction::IdentityLinked => "identity.linked",
            AuditAction::IdentityUnlinked => "identity.unlinked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResource {
    Session,
    Token,
    Identity,
    User,
}

impl AuditResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::Session => "session",
            AuditResource::Token => "token",
            AuditResource::Identity => "identity",
            AuditResource::User => "user",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(action: AuditAction, resource: AuditResource, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            action,
            resource,
            resource_id: None,
            ip_address: None,
            user_agent: None,
            metadata: BTreeMap::new(),
            success: true,
            error_message: None,
            created_at: at,
        }
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    pub fn meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Marks the entry as a failed attempt and records `reason` both as the
    /// error message and as `metadata.reason`.
    pub fn failed(mut self, reason: &str) -> Self {
        self.success = false;
        self.error_message = Some(reason.to_string());
        self.metadata
            .insert("reason".to_string(), reason.to_string());
        self
    }
}

/// Caller address and user agent attached to audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// Destination for audit entries. Recording never fails from the caller's
/// point of view.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditLog);
}

/// Writes entries to an [`AuditStore`] with a per-write timeout, logging and
/// counting failures instead of returning them.
pub struct StoreAuditSink {
    store: Arc<dyn AuditStore>,
    write_timeout: Duration,
    failures: AtomicU64,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_timeout(store, DEFAULT_AUDIT_WRITE_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<dyn AuditStore>, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
            failures: AtomicU64::new(0),
        }
    }

    /// Number of entries that could not be written since startup.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, entry: AuditLog) {
        let action = entry.action.as_str();
        match tokio::time::timeout(self.write_timeout, self.store.append_audit(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action, "audit write failed: {e}");
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action, "audit write timed out after {:?}", self.write_timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;

    struct BrokenStore;

    #[async_trait]
    impl AuditStore for BrokenStore {
        async fn append_audit(&self, _entry: &AuditLog) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl AuditStore for HangingStore {
        async fn append_audit(&self, _entry: &AuditLog) -> Result<(), StoreError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn entry() -> AuditLog {
        AuditLog::new(AuditAction::TokenUsed, AuditResource::Token, Utc::now())
    }

    #[tokio::test]
    async fn failing_store_is_counted_not_propagated() {
        let sink = StoreAuditSink::new(Arc::new(BrokenStore));
        sink.record(entry()).await;
        sink.record(entry()).await;
        assert_eq!(sink.failures(), 2);
    }

    #[tokio::test]
    async fn hanging_store_is_bounded_by_timeout() {
        let sink = StoreAuditSink::with_timeout(Arc::new(HangingStore), Duration::from_millis(20));
        sink.record(entry()).await;
        assert_eq!(sink.failures(), 1);
    }

    #[test]
    fn failed_sets_reason_and_flag() {
        let e = entry().failed("expired");
        assert!(!e.success);
        assert_eq!(e.error_message.as_deref(), Some("expired"));
        assert_eq!(e.metadata.get("reason").map(String::as_str), Some("expired"));
    }

    #[test]
    fn action_serializes_dotted() {
        let json = serde_json::to_string(&AuditAction::TokenRevokedAll).unwrap();
        assert_eq!(json, "\"token.revoked_all\"");
        assert_eq!(AuditAction::TokenRevokedAll.as_str(), "token.revoked_all");
    }
}
