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

//! Error types.
//!
//! [`AuthError`] is what the core returns. [`AppError`] is the HTTP boundary
//! type that implements Axum's `IntoResponse`; it is built from `AuthError`
//! by a single mapping that keeps every authentication failure generic.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use auth_types::{APIError, APIResponse};

use crate::db::StoreError;
use crate::http::FetchError;

/// Failures produced by the authentication core.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid state")]
    InvalidState,

    #[error("login session expired")]
    SessionExpired,

    #[error("login session already completed")]
    AlreadyCompleted,

    #[error("unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("JWKS error: {0}")]
    Jwks(String),

    #[error("signing key not found for kid: {0}")]
    KeyNotFound(String),

    #[error("ID token verification failed: {0}")]
    TokenVerification(String),

    #[error("authorization code exchange failed: {0}")]
    CodeExchange(String),

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("user is not allowed to sign in")]
    NotAllowed,

    #[error("invalid token")]
    InvalidToken,

    #[error("insufficient scope: {0} required")]
    InsufficientScope(String),

    #[error("scope not allowed: {0}")]
    ScopeNotAllowed(String),

    #[error("user is inactive")]
    InactiveUser,

    #[error("user not found")]
    UserNotFound,

    #[error("too many active tokens (limit {0})")]
    TooManyTokens(usize),

    #[error("cannot unlink the last identity")]
    LastIdentity,

    #[error("identity not found")]
    IdentityNotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Application-level error that pairs an HTTP status code with an [`APIError`].
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub body: APIError,
}

impl AppError {
    pub fn new(status: StatusCode, body: APIError) -> Self {
        Self { status, body }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, APIError::unauthorized())
    }

    pub fn authentication_failed() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, APIError::authentication_failed())
    }

    pub fn internal(detail: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            APIError::internal_error(detail),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = APIResponse::error(self.body);
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidState
            | AuthError::AlreadyCompleted
            | AuthError::UnknownProvider(_)
            | AuthError::KeyNotFound(_)
            | AuthError::TokenVerification(_)
            | AuthError::CodeExchange(_)
            | AuthError::NonceMismatch
            | AuthError::InvalidClaims(_)
            | AuthError::NotAllowed => {
                tracing::debug!("login rejected: {err}");
                Self::authentication_failed()
            }
            AuthError::SessionExpired => {
                Self::new(StatusCode::UNAUTHORIZED, APIError::session_expired())
            }
            AuthError::InvalidToken | AuthError::InactiveUser | AuthError::UserNotFound => {
                tracing::debug!("token rejected: {err}");
                Self::unauthorized()
            }
            AuthError::InsufficientScope(_) => {
                Self::new(StatusCode::FORBIDDEN, APIError::insufficient_scope())
            }
            AuthError::ScopeNotAllowed(scope) => {
                Self::new(StatusCode::FORBIDDEN, APIError::scope_not_allowed(&scope))
            }
            AuthError::TooManyTokens(limit) => {
                Self::new(StatusCode::CONFLICT, APIError::too_many_tokens(limit))
            }
            AuthError::LastIdentity => Self::new(StatusCode::CONFLICT, APIError::last_identity()),
            AuthError::IdentityNotFound => {
                Self::new(StatusCode::NOT_FOUND, APIError::not_found("Identity"))
            }
            AuthError::InvalidRequest(detail) => {
                Self::new(StatusCode::BAD_REQUEST, APIError::invalid_request(&detail))
            }
            AuthError::Discovery(_)
            | AuthError::Jwks(_)
            | AuthError::Config(_)
            | AuthError::Store(_)
            | AuthError::Fetch(_) => {
                tracing::error!("auth backend failure: {err}");
                Self::internal("internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    /// Consume the response body and deserialize it to `APIResponse<APIError>`.
    async fn read_error_body(resp: Response) -> (StatusCode, APIResponse<APIError>) {
        let status = resp.status();
        let bytes = Body::new(resp.into_body())
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let parsed: APIResponse<APIError> =
            serde_json::from_slice(&bytes).expect("deserialize error body");
        (status, parsed)
    }

    #[tokio::test]
    async fn unknown_and_replayed_state_are_indistinguishable() {
        let (s1, b1) =
            read_error_body(AppError::from(AuthError::InvalidState).into_response()).await;
        let (s2, b2) =
            read_error_body(AppError::from(AuthError::AlreadyCompleted).into_response()).await;
        assert_eq!(s1, s2);
        assert_eq!(b1.result, b2.result);
        assert_eq!(b1.result.code, "AUTHENTICATION_FAILED");
    }

    #[tokio::test]
    async fn session_expired_has_its_own_code() {
        let (status, body) =
            read_error_body(AppError::from(AuthError::SessionExpired).into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.result.code, "SESSION_EXPIRED");
    }

    #[tokio::test]
    async fn invalid_and_inactive_tokens_look_the_same() {
        let (_, a) = read_error_body(AppError::from(AuthError::InvalidToken).into_response()).await;
        let (_, b) = read_error_body(AppError::from(AuthError::InactiveUser).into_response()).await;
        assert_eq!(a.result, b.result);
    }

    #[tokio::test]
    async fn scope_not_allowed_produces_403_naming_scope() {
        let err = AppError::from(AuthError::ScopeNotAllowed("admin:*".to_string()));
        let (status, body) = read_error_body(err.into_response()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.result.message.contains("admin:*"));
    }

    #[tokio::test]
    async fn backend_errors_do_not_leak_detail() {
        let err = AppError::from(AuthError::Store(StoreError::Backend(
            "connection refused to 10.0.0.7".to_string(),
        )));
        let (status, body) = read_error_body(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.result.code, "INTERNAL_ERROR");
        assert!(!body
            .result
            .engineering_error
            .unwrap_or_default()
            .contains("10.0.0.7"));
    }
}
