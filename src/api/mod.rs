// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{WalletConnectionState, WalletNotice},
    ledger::Receipt,
    models::{
        ConnectWalletRequest, DonationRequest, Profile, ProfileEditRequest, PurchaseRequest,
        SignInRequest, SignUpRequest, Transaction, TransactionKind, TxStatus, WalletType,
    },
    providers::{
        ConnectedWallet, LinkedAccount, SessionUser, WalletLoginError, WalletProviderState,
        WalletUser,
    },
    state::{AppState, Backend},
};

pub mod auth;
pub mod health;
pub mod ledger;
pub mod profile;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/state", get(auth::get_state))
        .route("/auth/events", get(auth::events))
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/signout", post(auth::sign_out))
        .route(
            "/auth/profile-missing/dismiss",
            post(auth::dismiss_profile_missing),
        )
        .route(
            "/profile",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .route("/profile/reload", post(profile::reload_profile))
        .route("/wallet/connect", post(wallet::connect_wallet))
        .route("/wallet/disconnect", post(wallet::disconnect_wallet))
        .route("/wallet/notice/dismiss", post(wallet::dismiss_notice))
        .route(
            "/wallet/provider",
            get(wallet::get_provider_state).put(wallet::put_provider_state),
        )
        .route("/transactions", get(ledger::list_transactions))
        .route("/donations", post(ledger::donate))
        .route("/purchases", post(ledger::purchase))
        .route("/leaderboard", get(ledger::leaderboard))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::get_state,
        auth::events,
        auth::sign_up,
        auth::sign_in,
        auth::sign_out,
        auth::dismiss_profile_missing,
        profile::get_profile,
        profile::update_profile,
        profile::reload_profile,
        wallet::connect_wallet,
        wallet::disconnect_wallet,
        wallet::dismiss_notice,
        wallet::get_provider_state,
        wallet::put_provider_state,
        ledger::list_transactions,
        ledger::donate,
        ledger::purchase,
        ledger::leaderboard
    ),
    components(
        schemas(
            auth::AuthStateResponse,
            auth::SignUpResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            Backend,
            SessionUser,
            WalletUser,
            LinkedAccount,
            WalletConnectionState,
            WalletNotice,
            WalletType,
            WalletProviderState,
            WalletLoginError,
            ConnectedWallet,
            Profile,
            ProfileEditRequest,
            Transaction,
            TransactionKind,
            TxStatus,
            Receipt,
            SignUpRequest,
            SignInRequest,
            ConnectWalletRequest,
            DonationRequest,
            PurchaseRequest
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Password sessions and merged auth state"),
        (name = "Profile", description = "Profile of the signed-in user"),
        (name = "Wallet", description = "Wallet connection and provider state"),
        (name = "Ledger", description = "Donations, purchases and leaderboard")
    )
)]
struct ApiDoc;
