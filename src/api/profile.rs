// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    auth::AuthError,
    error::ApiError,
    models::{Profile, ProfileEditRequest, ProfileUpdate},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/profile",
    tag = "Profile",
    responses(
        (status = 200, body = Profile),
        (status = 401, description = "No user logged in"),
        (status = 404, description = "Profile could not be loaded")
    )
)]
pub async fn get_profile(State(state): State<AppState>) -> Result<Json<Profile>, ApiError> {
    let snapshot = state.auth.snapshot();
    if !snapshot.identity.is_authenticated() {
        return Err(AuthError::NotAuthenticated.into());
    }
    let profile = snapshot.profile.ok_or(AuthError::ProfileMissing)?;
    Ok(Json(profile))
}

#[utoipa::path(
    patch,
    path = "/v1/profile",
    request_body = ProfileEditRequest,
    tag = "Profile",
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 400, description = "Nothing to update"),
        (status = 401, description = "No user logged in")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileEditRequest>,
) -> Result<Json<Profile>, ApiError> {
    let update = ProfileUpdate::from(request);
    if update.is_empty() {
        return Err(ApiError::bad_request("No profile fields to update"));
    }
    let profile = state.auth.update_profile(update).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    post,
    path = "/v1/profile/reload",
    tag = "Profile",
    responses(
        (status = 200, body = Profile),
        (status = 404, description = "Profile could not be loaded")
    )
)]
pub async fn reload_profile(State(state): State<AppState>) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .auth
        .reload_profile()
        .await?
        .ok_or(AuthError::ProfileMissing)?;
    Ok(Json(profile))
}
