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

//! In-flight authorization-code login (`OidcSession`).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::secret::SecretString;

/// Where a session sits in the PENDING → COMPLETED state machine, as seen at
/// a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Pending,
    Completed,
    Expired,
}

/// One authorization-code flow, keyed by its `state` parameter.
///
/// The verifier and the provider tokens are [`SecretString`]s: they are
/// persisted but never printed and the type is not `Serialize`.
#[derive(Debug, Clone)]
pub struct OidcSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: SecretString,
    pub redirect_uri: String,
    pub return_to: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub id_token: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
}

impl OidcSession {
    /// Expiry wins over completion: a completed session past its deadline is
    /// reported as expired.
    pub fn flow_state(&self, now: DateTime<Utc>) -> FlowState {
        if now >= self.expires_at {
            FlowState::Expired
        } else if self.completed_at.is_some() {
            FlowState::Completed
        } else {
            FlowState::Pending
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Values bound to a session when it transitions to COMPLETED.
#[derive(Debug, Clone)]
pub struct SessionCompletion {
    pub user_id: Uuid,
    pub id_token: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(now: DateTime<Utc>) -> OidcSession {
        OidcSession {
            id: Uuid::new_v4(),
            user_id: None,
            provider: "google".to_string(),
            state: "s".to_string(),
            nonce: "n".to_string(),
            code_verifier: SecretString::new("v"),
            redirect_uri: "https://app/cb".to_string(),
            return_to: None,
            scopes: vec!["openid".to_string()],
            expires_at: now + Duration::minutes(30),
            created_at: now,
            last_refreshed: None,
            completed_at: None,
            id_token: None,
            access_token: None,
            refresh_token: None,
        }
    }

    #[test]
    fn pending_until_completed() {
        let now = Utc::now();
        let mut s = session(now);
        assert_eq!(s.flow_state(now), FlowState::Pending);
        s.completed_at = Some(now);
        assert_eq!(s.flow_state(now), FlowState::Completed);
    }

    #[test]
    fn expires_exactly_at_deadline() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(
            s.flow_state(s.expires_at - Duration::milliseconds(1)),
            FlowState::Pending
        );
        assert_eq!(s.flow_state(s.expires_at), FlowState::Expired);
    }

    #[test]
    fn debug_output_hides_verifier() {
        let s = session(Utc::now());
        let printed = format!("{s:?}");
        assert!(!printed.contains("code_verifier: SecretString(\"v\")"));
        assert!(printed.contains("[redacted]"));
    }
}
