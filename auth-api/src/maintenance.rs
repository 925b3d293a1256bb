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

//! Periodic retention sweep for login sessions and API tokens.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::service::{AuthService, TokenService};

#[derive(Debug, Clone, Copy)]
pub struct Retention {
    /// Login sessions older than this are deleted.
    pub sessions: chrono::Duration,
    /// Tokens expired longer than this are deleted.
    pub expired_tokens: chrono::Duration,
    /// Tokens revoked longer than this are deleted.
    pub revoked_tokens: chrono::Duration,
}

/// One pass over every cleanup. A failing step is logged and does not stop
/// the others.
pub async fn sweep(auth: &AuthService, tokens: &TokenService, retention: Retention) {
    if let Err(e) = auth.cleanup_expired_sessions(retention.sessions).await {
        tracing::warn!("session cleanup failed: {e}");
    }
    if let Err(e) = tokens.cleanup_expired_tokens(retention.expired_tokens).await {
        tracing::warn!("expired token cleanup failed: {e}");
    }
    if let Err(e) = tokens.cleanup_revoked_tokens(retention.revoked_tokens).await {
        tracing::warn!("revoked token cleanup failed: {e}");
    }
}

/// Run [`sweep`] every `period` until the process exits.
pub fn spawn(
    auth: Arc<AuthService>,
    tokens: Arc<TokenService>,
    retention: Retention,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::debug!("running retention sweep");
            sweep(&auth, &tokens, retention).await;
        }
    })
}
