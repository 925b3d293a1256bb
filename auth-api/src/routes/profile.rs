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

//! Profile and linked identities of the calling user.

use auth_types::responses::{IdentitySummary, ProfileResponse};
use auth_types::APIResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::RequestAuth;
use crate::error::AppError;
use crate::scope::PROFILE_READ;
use crate::state::AppState;

/// GET /api/v1/profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: RequestAuth,
) -> Result<Json<APIResponse<ProfileResponse>>, AppError> {
    let caller = auth.authenticate(&state, Some(PROFILE_READ)).await?;
    let identities = state.identities.list(caller.user.id).await?;
    let user = caller.user;

    Ok(Json(APIResponse::ok(ProfileResponse {
        user_id: user.id.to_string(),
        email: user.email,
        display_name: user.display_name,
        role: user.role.as_str().to_string(),
        identities: identities
            .into_iter()
            .map(|i| IdentitySummary {
                id: i.id.to_string(),
                provider: i.provider,
                email: i.email,
                email_verified: i.email_verified,
                display_name: i.display_name,
                last_login_at: i.last_login_at.timestamp(),
            })
            .collect(),
    })))
}

/// DELETE /api/v1/identities/{identity_id}
///
/// Fails with 409 when it is the caller's last identity.
pub async fn unlink_identity(
    State(state): State<AppState>,
    Path(identity_id): Path<Uuid>,
    auth: RequestAuth,
) -> Result<StatusCode, AppError> {
    let caller = auth.authenticate(&state, Some(PROFILE_READ)).await?;
    state
        .identities
        .unlink(caller.user.id, identity_id, &auth.client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
