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

//! First-party API tokens.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::scope;

/// A stored API token. Only the digest of the secret is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_name: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub last_used: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    /// Not revoked and not yet expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn has_scope(&self, required: &str) -> bool {
        scope::has_scope(&self.scopes, required)
    }
}

/// The plaintext secret of a freshly created token.
///
/// Exists only in the return value of token creation; it is not `Serialize`,
/// not `Clone`, and `Debug` does not print it.
pub struct PlaintextToken(String);

impl PlaintextToken {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for PlaintextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextToken([redacted])")
    }
}

/// Result of token creation: the stored row plus the one-time plaintext.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: ApiToken,
    pub plaintext: PlaintextToken,
}
