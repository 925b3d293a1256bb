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

//! API token management for the calling user.

use auth_types::requests::CreateTokenRequest;
use auth_types::responses::{
    CreatedTokenResponse, RevokeAllResponse, TokenListResponse, TokenSummary,
};
use auth_types::APIResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::RequestAuth;
use crate::error::AppError;
use crate::model::ApiToken;
use crate::state::AppState;

fn summary(token: ApiToken) -> TokenSummary {
    TokenSummary {
        id: token.id.to_string(),
        device_name: token.device_name,
        scopes: token.scopes,
        created_at: token.created_at.timestamp(),
        expires_at: token.expires_at.timestamp(),
        last_used: token.last_used.map(|t| t.timestamp()),
        revoked_at: token.revoked_at.map(|t| t.timestamp()),
    }
}

/// GET /api/v1/tokens
pub async fn list_tokens(
    State(state): State<AppState>,
    auth: RequestAuth,
) -> Result<Json<APIResponse<TokenListResponse>>, AppError> {
    let caller = auth.authenticate(&state, None).await?;
    let tokens = state.tokens.list(caller.user.id).await?;
    Ok(Json(APIResponse::ok(TokenListResponse {
        tokens: tokens.into_iter().map(summary).collect(),
    })))
}

/// Requested lifetime in seconds, saturating at the representable range.
/// The service rejects non-positive values and clamps to its maximum.
fn expiry_from_secs(secs: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs).unwrap_or(if secs > 0 {
        chrono::Duration::MAX
    } else {
        chrono::Duration::MIN
    })
}

/// POST /api/v1/tokens
///
/// The plaintext token appears in this response and nowhere else.
pub async fn create_token(
    State(state): State<AppState>,
    auth: RequestAuth,
    Json(body): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<APIResponse<CreatedTokenResponse>>), AppError> {
    let caller = auth.authenticate(&state, None).await?;
    let issued = state
        .tokens
        .create(
            caller.user.id,
            &body.device_name,
            body.scopes,
            body.expires_in_secs.map(expiry_from_secs),
            caller.user.id,
            &auth.client,
        )
        .await?;

    let token = issued.token;
    Ok((
        StatusCode::CREATED,
        Json(APIResponse::ok(CreatedTokenResponse {
            id: token.id.to_string(),
            token: issued.plaintext.into_inner(),
            device_name: token.device_name,
            scopes: token.scopes,
            expires_at: token.expires_at.timestamp(),
        })),
    ))
}

/// DELETE /api/v1/tokens/{token_id}
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
    auth: RequestAuth,
) -> Result<StatusCode, AppError> {
    let caller = auth.authenticate(&state, None).await?;
    state
        .tokens
        .revoke(token_id, &caller.user, &auth.client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tokens/revoke-all
pub async fn revoke_all_tokens(
    State(state): State<AppState>,
    auth: RequestAuth,
) -> Result<Json<APIResponse<RevokeAllResponse>>, AppError> {
    let caller = auth.authenticate(&state, None).await?;
    let revoked = state
        .tokens
        .revoke_all(caller.user.id, &auth.client)
        .await?;
    Ok(Json(APIResponse::ok(RevokeAllResponse { revoked })))
}
