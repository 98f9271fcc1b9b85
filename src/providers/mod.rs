// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Hosted Collaborators
//!
//! The core never talks to a vendor SDK directly. It consumes three seams:
//!
//! - [`SessionStore`] - hosted email/password auth (credentials, session tokens)
//! - [`WalletProvider`] - hosted wallet login (handshake, chain detection,
//!   connected-wallet list)
//! - [`ProfileRepository`] - hosted row store with `profiles` and
//!   `transactions` tables
//!
//! Implementations:
//!
//! - [`supabase::SupabaseClient`] - REST client for the hosted auth and row
//!   store
//! - [`wallet_bridge::WalletBridge`] - wallet state published by the browser,
//!   where the wallet SDK actually runs
//! - [`memory`] - in-process backend for offline runs and tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use utoipa::ToSchema;

use crate::models::{NewProfile, NewTransaction, Profile, ProfileUpdate, Transaction};

pub mod memory;
pub mod supabase;
pub mod wallet_bridge;

pub use memory::{InMemoryProfileRepository, InMemorySessionStore};
pub use supabase::SupabaseClient;
pub use wallet_bridge::WalletBridge;

/// Capacity of session event channels.
pub const SESSION_EVENT_CAPACITY: usize = 32;

// =============================================================================
// Errors
// =============================================================================

/// Failure reported by the session store or the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused the request; carries the provider's message.
    #[error("{0}")]
    Rejected(String),

    /// The user dismissed the provider's own UI.
    #[error("User rejected the request")]
    UserRejected,

    /// The wallet extension or provider is missing, locked or not initialized.
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),
}

/// Failure reported by the profile repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The backing schema does not have the column.
    #[error("column '{column}' does not exist on '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("row conflict: {0}")]
    Conflict(String),

    #[error("repository request failed: {0}")]
    Request(String),

    #[error("repository response was invalid: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Session Store
// =============================================================================

/// User as known to the hosted auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An active hosted auth session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

/// Session change notification, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl SessionEvent {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionEvent::SignedIn(session) | SessionEvent::TokenRefreshed(session) => {
                Some(session)
            }
            SessionEvent::SignedOut => None,
        }
    }
}

/// Result of a sign-up. A missing session means email confirmation is
/// pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user: Option<SessionUser>,
    pub session: Option<Session>,
}

/// Hosted email/password auth.
///
/// Dropping the receiver returned by [`SessionStore::subscribe`] is the
/// unsubscribe.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

// =============================================================================
// Wallet Provider
// =============================================================================

/// Account linked to a wallet provider user (email, social login, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LinkedAccount {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// User authenticated by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linked_accounts: Vec<LinkedAccount>,
}

impl WalletUser {
    fn linked_email(&self) -> Option<&LinkedAccount> {
        self.linked_accounts
            .iter()
            .find(|account| account.kind == "email")
    }

    /// The user's email, direct or from a linked email account.
    pub fn email_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or_else(|| self.linked_email().and_then(|a| a.address.as_deref()))
            .filter(|email| !email.is_empty())
    }

    /// Display name attached to the linked email account, if any.
    pub fn linked_email_name(&self) -> Option<&str> {
        self.linked_email()
            .and_then(|account| account.name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// A wallet the provider reports as connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectedWallet {
    pub address: String,
    /// CAIP-2 style chain identifier, e.g. `eip155:1` or `solana:mainnet`.
    #[serde(default)]
    pub chain_id: Option<String>,
}

/// How the provider's login flow failed, as reported by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletLoginError {
    /// The user closed the provider's modal.
    Cancelled,
    /// No wallet extension, or it is locked.
    Unavailable {
        #[serde(default)]
        message: Option<String>,
    },
}

impl From<&WalletLoginError> for ProviderError {
    fn from(error: &WalletLoginError) -> Self {
        match error {
            WalletLoginError::Cancelled => ProviderError::UserRejected,
            WalletLoginError::Unavailable { message } => ProviderError::WalletUnavailable(
                message
                    .clone()
                    .unwrap_or_else(|| "wallet not installed or locked".to_string()),
            ),
        }
    }
}

/// Live state of the wallet provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletProviderState {
    /// The provider itself finished initializing.
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<WalletUser>,
    /// The connected-wallets list finished loading.
    #[serde(default)]
    pub wallets_ready: bool,
    #[serde(default)]
    pub wallets: Vec<ConnectedWallet>,
    /// A login was requested and the provider UI should be shown.
    #[serde(default)]
    pub login_requested: bool,
    /// Outcome of the last requested login when it failed. Cleared when a
    /// new login is requested.
    #[serde(default)]
    pub login_error: Option<WalletLoginError>,
}

impl WalletProviderState {
    /// The single wallet the core considers: the first one reported.
    pub fn primary_wallet(&self) -> Option<&ConnectedWallet> {
        self.wallets.first()
    }

    /// The provider is reporting at least one live wallet.
    pub fn has_live_wallet(&self) -> bool {
        self.wallets_ready && !self.wallets.is_empty()
    }

    /// The provider reports, after its readiness check, that no wallet is
    /// connected.
    pub fn confirms_no_wallet(&self) -> bool {
        self.wallets_ready && self.wallets.is_empty()
    }

    /// Authenticated wallet user with wallets, eligible for profile sync.
    pub fn syncable_user(&self) -> Option<&WalletUser> {
        if self.ready && self.authenticated && !self.wallets.is_empty() {
            self.user.as_ref()
        } else {
            None
        }
    }
}

/// Hosted wallet login.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn state(&self) -> WalletProviderState;

    fn subscribe(&self) -> watch::Receiver<WalletProviderState>;

    /// Start the provider's connection flow. The provider owns its UI; the
    /// connected wallet arrives later through [`WalletProvider::subscribe`].
    async fn login(&self) -> Result<(), ProviderError>;

    async fn logout(&self) -> Result<(), ProviderError>;
}

// =============================================================================
// Profile Repository
// =============================================================================

/// Hosted `profiles` and `transactions` tables.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>, RepositoryError>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, RepositoryError>;

    async fn update_profile(&self, id: &str, update: &ProfileUpdate)
        -> Result<(), RepositoryError>;

    /// Profiles ordered by score, highest first.
    async fn top_profiles(&self, limit: usize) -> Result<Vec<Profile>, RepositoryError>;

    /// A user's transactions, newest first.
    async fn list_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    async fn insert_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError>;
}
