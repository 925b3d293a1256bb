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

//! Response types for the auth REST API.
//!
//! Every endpoint returns an [`APIResponse<T>`] envelope:
//! - On success: `{ "success": true,  "result": <T> }`
//! - On failure: `{ "success": false, "result": <APIError> }`

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Generic envelope
// ---------------------------------------------------------------------------

/// Top-level API response envelope.
///
/// # Success example
///
/// ```json
/// { "success": true, "result": { "id": "…", "token": "ak_…", ... } }
/// ```
///
/// # Error example
///
/// ```json
/// { "success": false, "result": { "code": "UNAUTHORIZED", "message": "..." } }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct APIResponse<A: Serialize> {
    pub success: bool,
    pub result: A,
}

impl<A: Serialize> APIResponse<A> {
    /// Wrap a successful result.
    pub fn ok(result: A) -> Self {
        Self {
            success: true,
            result,
        }
    }
}

impl APIResponse<crate::error::APIError> {
    /// Wrap an error result.
    pub fn error(err: crate::error::APIError) -> Self {
        Self {
            success: false,
            result: err,
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint-specific response payloads
// ---------------------------------------------------------------------------

/// Response payload for `POST /api/v1/tokens` (201 Created).
///
/// `token` is the plaintext secret. It is returned exactly once and cannot be
/// recovered afterwards.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreatedTokenResponse {
    pub id: String,
    pub token: String,
    pub device_name: String,
    pub scopes: Vec<String>,
    /// Unix timestamp in seconds.
    pub expires_at: i64,
}

/// One entry in `GET /api/v1/tokens`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenSummary {
    pub id: String,
    pub device_name: String,
    pub scopes: Vec<String>,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<i64>,
}

/// Response payload for `GET /api/v1/tokens`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenSummary>,
}

/// Response payload for `POST /api/v1/tokens/revoke-all`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

/// A federated identity linked to the user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentitySummary {
    pub id: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub last_login_at: i64,
}

/// Response payload for `GET /api/v1/profile`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProfileResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub identities: Vec<IdentitySummary>,
}
