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

//! Request types for the auth REST API.
//!
//! These types define the shape of request bodies and query parameters.
//! They are used by both the server (for deserialization) and clients
//! (for serialization).

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/v1/tokens`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateTokenRequest {
    /// Free-form label shown in token listings (e.g. "laptop", "discord-bot").
    pub device_name: String,

    /// Requested scopes. Empty means the default set for the caller's role.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Lifetime in seconds. Server default applies when omitted.
    #[serde(default)]
    pub expires_in_secs: Option<i64>,
}

/// Query parameters for `GET /auth/{provider}/login`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoginQuery {
    /// Where to send the browser after a successful login.
    #[serde(rename = "returnTo", default)]
    pub return_to: Option<String>,
}

/// Query parameters delivered by the identity provider to `GET /auth/callback`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CallbackQuery {
    pub state: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_token_request_defaults() {
        let req: CreateTokenRequest = serde_json::from_str(r#"{"device_name":"cli"}"#).unwrap();
        assert_eq!(req.device_name, "cli");
        assert!(req.scopes.is_empty());
        assert!(req.expires_in_secs.is_none());
    }

    #[test]
    fn login_query_reads_camel_case_return_to() {
        let q: LoginQuery = serde_json::from_str(r#"{"returnTo":"/wiki"}"#).unwrap();
        assert_eq!(q.return_to.as_deref(), Some("/wiki"));
    }
}
