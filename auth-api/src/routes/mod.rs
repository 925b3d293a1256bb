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

//! Axum router configuration for the auth service.

pub mod oauth;
pub mod profile;
pub mod tokens;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

/// Build the full application router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Browser login
        .route("/auth/{provider}/login", get(oauth::login))
        .route("/auth/callback", get(oauth::callback))
        .route("/logout", post(oauth::logout))
        // Profile / identities
        .route("/api/v1/profile", get(profile::get_profile))
        .route(
            "/api/v1/identities/{identity_id}",
            delete(profile::unlink_identity),
        )
        // API tokens
        .route("/api/v1/tokens", get(tokens::list_tokens))
        .route("/api/v1/tokens", post(tokens::create_token))
        .route("/api/v1/tokens/revoke-all", post(tokens::revoke_all_tokens))
        .route("/api/v1/tokens/{token_id}", delete(tokens::revoke_token))
}
