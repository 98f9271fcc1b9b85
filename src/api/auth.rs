// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, AuthSnapshot, Identity, WalletConnectionState, WalletNotice},
    error::ApiError,
    models::{Profile, SignInRequest, SignUpRequest, WalletType},
    state::AppState,
};

/// Auth state as rendered by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuthStateResponse {
    /// `{"source": "anonymous" | "session" | "wallet", ...user}`
    #[schema(value_type = Object)]
    pub identity: Identity,
    pub profile: Option<Profile>,
    pub loading: bool,
    /// Set while a connect is pending, before the address is known.
    pub connected_wallet: Option<WalletType>,
    pub wallet_address: Option<String>,
    pub wallet: WalletConnectionState,
    pub profile_missing: bool,
    pub wallet_notice: Option<WalletNotice>,
    pub wallet_notice_message: Option<String>,
}

impl From<&AuthSnapshot> for AuthStateResponse {
    fn from(snapshot: &AuthSnapshot) -> Self {
        Self {
            identity: snapshot.identity.clone(),
            profile: snapshot.profile.clone(),
            loading: snapshot.loading,
            connected_wallet: snapshot.connected_wallet(),
            wallet_address: snapshot.wallet_address().map(str::to_string),
            wallet: snapshot.wallet.clone(),
            profile_missing: snapshot.profile_missing,
            wallet_notice: snapshot.wallet_notice.clone(),
            wallet_notice_message: snapshot.wallet_notice.as_ref().map(WalletNotice::message),
        }
    }
}

/// Outcome of a sign-up.
#[derive(Debug, Serialize, ToSchema)]
pub struct SignUpResponse {
    /// The account must confirm its email before signing in.
    pub confirmation_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub state: AuthStateResponse,
}

#[utoipa::path(
    get,
    path = "/v1/auth/state",
    tag = "Auth",
    responses((status = 200, body = AuthStateResponse))
)]
pub async fn get_state(State(state): State<AppState>) -> Json<AuthStateResponse> {
    Json(AuthStateResponse::from(&state.auth.snapshot()))
}

/// Stream of auth state changes. The current state is sent first.
#[utoipa::path(
    get,
    path = "/v1/auth/events",
    tag = "Auth",
    responses((status = 200, content_type = "text/event-stream", body = AuthStateResponse))
)]
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.auth.subscribe();
    let stream = stream::unfold((receiver, true), |(mut receiver, first)| async move {
        if !first && receiver.changed().await.is_err() {
            return None;
        }
        let view = AuthStateResponse::from(&*receiver.borrow_and_update());
        let event = match Event::default().event("auth").json_data(&view) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Failed to encode auth event");
                Event::default().event("error").data("encoding failed")
            }
        };
        Some((Ok(event), (receiver, false)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignUpRequest,
    tag = "Auth",
    responses(
        (status = 201, description = "Account created and signed in", body = SignUpResponse),
        (status = 202, description = "Email confirmation required", body = SignUpResponse),
        (status = 401, description = "Rejected by the auth service")
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    match state
        .auth
        .sign_up(
            &request.email,
            &request.password,
            &request.username,
            &request.full_name,
        )
        .await
    {
        Ok(()) => {
            let snapshot = state.settled_snapshot().await;
            Ok((
                StatusCode::CREATED,
                Json(SignUpResponse {
                    confirmation_required: false,
                    message: None,
                    state: AuthStateResponse::from(&snapshot),
                }),
            ))
        }
        Err(AuthError::ConfirmationRequired) => Ok((
            StatusCode::ACCEPTED,
            Json(SignUpResponse {
                confirmation_required: true,
                message: Some(AuthError::ConfirmationRequired.to_string()),
                state: AuthStateResponse::from(&state.auth.snapshot()),
            }),
        )),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = SignInRequest,
    tag = "Auth",
    responses(
        (status = 200, body = AuthStateResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<AuthStateResponse>, ApiError> {
    state.auth.sign_in(&request.email, &request.password).await?;
    let snapshot = state.settled_snapshot().await;
    Ok(Json(AuthStateResponse::from(&snapshot)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/signout",
    tag = "Auth",
    responses((status = 204))
)]
pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.auth.sign_out().await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/v1/auth/profile-missing/dismiss",
    tag = "Auth",
    responses((status = 204))
)]
pub async fn dismiss_profile_missing(State(state): State<AppState>) -> StatusCode {
    state.auth.dismiss_profile_missing();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up_request(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: "secret1".into(),
            username: String::new(),
            full_name: String::new(),
        }
    }

    #[tokio::test]
    async fn sign_up_returns_settled_state() {
        let state = AppState::in_memory().await;

        let (status, Json(response)) =
            sign_up(State(state.clone()), Json(sign_up_request("a@b.com")))
                .await
                .expect("sign-up succeeds");

        assert_eq!(status, StatusCode::CREATED);
        assert!(!response.confirmation_required);
        assert!(!response.state.loading);
        assert_eq!(response.state.profile.unwrap().username, "a");
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_is_unauthorized() {
        let state = AppState::in_memory().await;
        sign_up(State(state.clone()), Json(sign_up_request("a@b.com")))
            .await
            .unwrap();
        sign_out(State(state.clone())).await;

        let err = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                email: "a@b.com".into(),
                password: "nope-nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, Some("auth_error"));
    }

    #[tokio::test]
    async fn sign_out_resets_state() {
        let state = AppState::in_memory().await;
        sign_up(State(state.clone()), Json(sign_up_request("x@y.io")))
            .await
            .unwrap();

        assert_eq!(sign_out(State(state.clone())).await, StatusCode::NO_CONTENT);

        let Json(view) = get_state(State(state)).await;
        assert_eq!(view.identity, Identity::Anonymous);
        assert!(view.profile.is_none());
        assert_eq!(view.connected_wallet, None);
    }

    #[test]
    fn view_exposes_pending_wallet_type_without_address() {
        let snapshot = AuthSnapshot {
            wallet: WalletConnectionState::Pending {
                wallet_type: WalletType::Solana,
            },
            ..AuthSnapshot::signed_out()
        };
        let view = AuthStateResponse::from(&snapshot);
        assert_eq!(view.connected_wallet, Some(WalletType::Solana));
        assert_eq!(view.wallet_address, None);
    }
}
