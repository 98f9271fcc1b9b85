// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use super::auth::AuthStateResponse;
use crate::{
    error::ApiError,
    models::ConnectWalletRequest,
    providers::{WalletProvider, WalletProviderState},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/wallet/connect",
    request_body = ConnectWalletRequest,
    tag = "Wallet",
    responses(
        (status = 202, description = "Connect started; the address follows via provider state", body = AuthStateResponse),
        (status = 409, description = "Connect cancelled or wallet unavailable")
    )
)]
pub async fn connect_wallet(
    State(state): State<AppState>,
    Json(request): Json<ConnectWalletRequest>,
) -> Result<(StatusCode, Json<AuthStateResponse>), ApiError> {
    state.auth.connect_wallet(request.wallet_type).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AuthStateResponse::from(&state.auth.snapshot())),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/wallet/disconnect",
    tag = "Wallet",
    responses((status = 200, body = AuthStateResponse))
)]
pub async fn disconnect_wallet(State(state): State<AppState>) -> Json<AuthStateResponse> {
    state.auth.disconnect_wallet().await;
    Json(AuthStateResponse::from(&state.auth.snapshot()))
}

#[utoipa::path(
    post,
    path = "/v1/wallet/notice/dismiss",
    tag = "Wallet",
    responses((status = 204))
)]
pub async fn dismiss_notice(State(state): State<AppState>) -> StatusCode {
    state.auth.dismiss_wallet_notice();
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/v1/wallet/provider",
    tag = "Wallet",
    responses((status = 200, body = WalletProviderState))
)]
pub async fn get_provider_state(State(state): State<AppState>) -> Json<WalletProviderState> {
    Json(state.wallet_bridge.state())
}

/// Publish the wallet SDK's state as seen by the browser.
///
/// A login that ends without a wallet is reported through `login_error`;
/// a pending connect then rolls back and leaves a notice.
#[utoipa::path(
    put,
    path = "/v1/wallet/provider",
    request_body = WalletProviderState,
    tag = "Wallet",
    responses((status = 204))
)]
pub async fn put_provider_state(
    State(state): State<AppState>,
    Json(provider): Json<WalletProviderState>,
) -> StatusCode {
    state.wallet_bridge.publish(provider);
    StatusCode::NO_CONTENT
}
