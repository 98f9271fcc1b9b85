// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    ledger::Receipt,
    models::{DonationRequest, Profile, PurchaseRequest, Transaction},
    state::AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LimitQuery {
    /// Maximum number of rows (default 10, at most 100).
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v1/transactions",
    params(LimitQuery),
    tag = "Ledger",
    responses(
        (status = 200, description = "Newest first", body = [Transaction]),
        (status = 401, description = "No user logged in")
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.ledger.history(query.limit).await?))
}

#[utoipa::path(
    post,
    path = "/v1/donations",
    request_body = DonationRequest,
    tag = "Ledger",
    responses(
        (status = 201, body = Receipt),
        (status = 422, description = "Amount is not a positive number")
    )
)]
pub async fn donate(
    State(state): State<AppState>,
    Json(request): Json<DonationRequest>,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let receipt = state.ledger.donate(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    post,
    path = "/v1/purchases",
    request_body = PurchaseRequest,
    tag = "Ledger",
    responses(
        (status = 201, body = Receipt),
        (status = 422, description = "Amount is not a positive number")
    )
)]
pub async fn purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let receipt = state.ledger.purchase(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/v1/leaderboard",
    params(LimitQuery),
    tag = "Ledger",
    responses((status = 200, description = "Highest CareLevel score first", body = [Profile]))
)]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(state.ledger.leaderboard(query.limit).await?))
}
