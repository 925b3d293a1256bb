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

//! Axum extractor for the presented API token and the caller's address.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::audit::ClientInfo;
use crate::error::AppError;
use crate::service::ValidatedToken;
use crate::state::AppState;

/// Name of the cookie carrying the browser's token.
pub const SESSION_COOKIE: &str = "session";

/// What the request presented: a token from `Authorization: Bearer` or the
/// `session` cookie (the header wins), plus client info for the audit trail.
///
/// Extraction never fails; call [`RequestAuth::authenticate`] to require a
/// valid token.
///
/// ```ignore
/// async fn handler(State(state): State<AppState>, auth: RequestAuth) {
///     let caller = auth.authenticate(&state, Some("profile:read")).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestAuth {
    token: Option<String>,
    pub client: ClientInfo,
}

impl RequestAuth {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            token: presented_token(headers),
            client: client_info(headers),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Validate the presented token, optionally requiring `scope`.
    pub async fn authenticate(
        &self,
        state: &AppState,
        scope: Option<&str>,
    ) -> Result<ValidatedToken, AppError> {
        let token = self.token.as_deref().ok_or_else(AppError::unauthorized)?;
        Ok(state.tokens.validate(token, scope, &self.client).await?)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestAuth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Client IP from the first `X-Forwarded-For` hop, else `X-Real-IP`; user
/// agent from `User-Agent`.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .map(str::to_string);

    ClientInfo::new(ip, header_str("user-agent").map(str::to_string))
}
