// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::state::WalletNotice;
use crate::providers::{ProviderError, RepositoryError};

/// Error taxonomy of the identity reconciler and wallet manager.
///
/// Authentication and profile-mutation errors propagate to the caller.
/// `WalletConnectFailed` is transient and `RepositoryWriteFailed` is only
/// ever logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// Bad credentials or another provider rejection; carries the provider's
    /// message.
    #[error("{0}")]
    Auth(String),

    /// Sign-up succeeded but the account waits for email confirmation.
    #[error("Please check your email and click the confirmation link to complete your registration.")]
    ConfirmationRequired,

    /// A profile mutation was attempted without an active identity.
    #[error("No user logged in")]
    NotAuthenticated,

    /// The post-login profile lookup or creation failed.
    #[error("Your profile could not be found. Please sign out and try again.")]
    ProfileMissing,

    #[error("{}", .0.message())]
    WalletConnectFailed(WalletNotice),

    /// Best-effort mirror write to the profile row failed.
    #[error("profile mirror write failed: {0}")]
    RepositoryWriteFailed(RepositoryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Map a session store failure on a credential operation.
    pub fn from_provider(error: ProviderError) -> Self {
        match error {
            ProviderError::Rejected(message) => AuthError::Auth(message),
            other => AuthError::Auth(other.to_string()),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Auth(_) => "auth_error",
            AuthError::ConfirmationRequired => "confirmation_required",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::ProfileMissing => "profile_missing",
            AuthError::WalletConnectFailed(WalletNotice::Cancelled { .. }) => {
                "wallet_connect_cancelled"
            }
            AuthError::WalletConnectFailed(WalletNotice::Unavailable { .. }) => {
                "wallet_unavailable"
            }
            AuthError::RepositoryWriteFailed(_) => "repository_write_failed",
            AuthError::Repository(RepositoryError::MissingColumn { .. }) => "schema_mismatch",
            AuthError::Repository(_) => "repository_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Auth(_) | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthError::ConfirmationRequired => StatusCode::ACCEPTED,
            AuthError::ProfileMissing => StatusCode::NOT_FOUND,
            AuthError::WalletConnectFailed(_) => StatusCode::CONFLICT,
            AuthError::RepositoryWriteFailed(_) | AuthError::Repository(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Failures the UI shows as a dismissible alert.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::WalletConnectFailed(_) | AuthError::RepositoryWriteFailed(_)
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
