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

//! API error types.
//!
//! Every failed API response is returned as `APIResponse<APIError>` with `success: false`.
//! Login and token failures are deliberately generic: an unknown `state` and a
//! replayed one produce the same body, as do a missing and a revoked token.

use serde::{Deserialize, Serialize};

/// Structured error returned in the `result` field of a failed [`super::APIResponse`].
///
/// The `code` field is a machine-readable identifier (e.g. `"UNAUTHORIZED"`).
/// The `message` field is a human-readable description suitable for display.
/// The `engineering_error` field carries debug-level detail that is useful
/// during development but is never populated for authentication failures.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct APIError {
    /// Machine-readable error code (e.g. `"UNAUTHORIZED"`, `"SESSION_EXPIRED"`).
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Optional engineering-level detail for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engineering_error: Option<String>,
}

impl APIError {
    fn plain(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            engineering_error: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::plain("UNAUTHORIZED", "Authentication required.")
    }

    pub fn authentication_failed() -> Self {
        Self::plain("AUTHENTICATION_FAILED", "Authentication failed.")
    }

    pub fn session_expired() -> Self {
        Self::plain(
            "SESSION_EXPIRED",
            "Your login session expired. Please sign in again.",
        )
    }

    pub fn insufficient_scope() -> Self {
        Self::plain(
            "INSUFFICIENT_SCOPE",
            "This token is not allowed to perform this action.",
        )
    }

    pub fn scope_not_allowed(scope: &str) -> Self {
        Self::plain(
            "SCOPE_NOT_ALLOWED",
            format!("Scope '{scope}' is not permitted for your account"),
        )
    }

    pub fn too_many_tokens(limit: usize) -> Self {
        Self::plain(
            "TOO_MANY_TOKENS",
            format!("Active token limit reached (maximum is {limit})"),
        )
    }

    pub fn last_identity() -> Self {
        Self::plain(
            "LAST_IDENTITY",
            "At least one linked identity must remain on the account",
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::plain("NOT_FOUND", format!("{what} not found"))
    }

    pub fn invalid_request(detail: &str) -> Self {
        Self::plain("INVALID_REQUEST", format!("Invalid request: {detail}"))
    }

    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: "INTERNAL_ERROR".to_string(),
            message: "Internal server error".to_string(),
            engineering_error: Some(detail.to_string()),
        }
    }
}

impl std::fmt::Display for APIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for APIError {}
