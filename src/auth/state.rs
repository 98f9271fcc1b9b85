// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth State
//!
//! [`AuthSnapshot`] is the single value the view layer reads. It is owned by
//! a [`tokio::sync::watch`] channel inside [`Shared`]; every mutation goes
//! through that channel so subscribers always see a consistent snapshot.
//!
//! Two epochs order concurrent work:
//!
//! - the identity epoch advances whenever the identity changes, so a profile
//!   load that started for an older identity is discarded on arrival
//! - the wallet epoch advances on every explicit disconnect, so a connect
//!   attempt that resolves afterwards never resurrects the connection

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use super::identity::Identity;
use crate::models::{Profile, WalletType};
use crate::providers::{ProfileRepository, SessionStore, WalletProvider};

// =============================================================================
// Wallet Connection
// =============================================================================

/// Wallet connection as seen by the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletConnectionState {
    #[default]
    Disconnected,
    /// A connect was requested and the provider has not confirmed a wallet yet.
    Pending { wallet_type: WalletType },
    Connected {
        wallet_type: WalletType,
        address: String,
    },
}

impl WalletConnectionState {
    /// Wallet type shown to the UI. Set while pending, with no address yet.
    pub fn wallet_type(&self) -> Option<WalletType> {
        match self {
            WalletConnectionState::Disconnected => None,
            WalletConnectionState::Pending { wallet_type }
            | WalletConnectionState::Connected { wallet_type, .. } => Some(*wallet_type),
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            WalletConnectionState::Connected { address, .. } => Some(address),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, WalletConnectionState::Pending { .. })
    }
}

/// Dismissible alert left behind by a failed connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletNotice {
    /// The user dismissed the provider's UI.
    Cancelled { wallet_type: WalletType },
    /// The wallet is missing, locked or the provider is not initialized.
    Unavailable { wallet_type: WalletType },
}

impl WalletNotice {
    pub fn wallet_type(&self) -> WalletType {
        match self {
            WalletNotice::Cancelled { wallet_type } | WalletNotice::Unavailable { wallet_type } => {
                *wallet_type
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            WalletNotice::Cancelled { .. } => "Wallet connection was cancelled".to_string(),
            WalletNotice::Unavailable { wallet_type } => format!(
                "Failed to connect {wallet_type} wallet. Please ensure your wallet is installed and unlocked."
            ),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Everything the view layer needs to render auth state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub identity: Identity,
    pub profile: Option<Profile>,
    /// True until the initial session check completes, and while the first
    /// profile load for a new identity is in flight.
    pub loading: bool,
    pub wallet: WalletConnectionState,
    /// The post-login profile lookup or creation failed.
    pub profile_missing: bool,
    pub wallet_notice: Option<WalletNotice>,
    /// Connection to restore if the pending connect fails.
    #[serde(skip)]
    pub(crate) wallet_before_connect: Option<WalletConnectionState>,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            identity: Identity::Anonymous,
            profile: None,
            loading: true,
            wallet: WalletConnectionState::Disconnected,
            profile_missing: false,
            wallet_notice: None,
            wallet_before_connect: None,
        }
    }
}

impl AuthSnapshot {
    /// State right after a sign-out.
    pub fn signed_out() -> Self {
        Self {
            loading: false,
            ..Self::default()
        }
    }

    pub fn connected_wallet(&self) -> Option<WalletType> {
        self.wallet.wallet_type()
    }

    pub fn wallet_address(&self) -> Option<&str> {
        self.wallet.address()
    }
}

// =============================================================================
// Shared Core
// =============================================================================

/// State and collaborators shared by the reconciler, the wallet manager and
/// the event loop.
pub(crate) struct Shared {
    pub sessions: Arc<dyn SessionStore>,
    pub wallets: Arc<dyn WalletProvider>,
    pub profiles: Arc<dyn ProfileRepository>,
    snapshot: watch::Sender<AuthSnapshot>,
    identity_epoch: AtomicU64,
    wallet_epoch: AtomicU64,
}

impl Shared {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        wallets: Arc<dyn WalletProvider>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        Self {
            sessions,
            wallets,
            profiles,
            snapshot,
            identity_epoch: AtomicU64::new(0),
            wallet_epoch: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn identity_epoch(&self) -> u64 {
        self.identity_epoch.load(Ordering::SeqCst)
    }

    pub fn wallet_epoch(&self) -> u64 {
        self.wallet_epoch.load(Ordering::SeqCst)
    }

    /// Mutate the snapshot and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut AuthSnapshot)) {
        self.snapshot.send_modify(f);
    }

    /// Mutate the snapshot, notifying subscribers only when `f` reports a
    /// change.
    pub fn update_if(&self, f: impl FnOnce(&mut AuthSnapshot) -> bool) -> bool {
        self.snapshot.send_if_modified(f)
    }

    /// Switch identity: advance the identity epoch and apply `f` under the
    /// same lock. Returns the new epoch.
    pub fn switch_identity(&self, f: impl FnOnce(&mut AuthSnapshot)) -> u64 {
        let mut epoch = 0;
        self.snapshot.send_modify(|snapshot| {
            epoch = self.identity_epoch.fetch_add(1, Ordering::SeqCst) + 1;
            f(snapshot);
        });
        epoch
    }

    /// Switch identity only if no other switch happened since `epoch`.
    pub fn switch_identity_if(&self, epoch: u64, f: impl FnOnce(&mut AuthSnapshot)) -> bool {
        self.snapshot.send_if_modified(|snapshot| {
            if self.identity_epoch() != epoch {
                return false;
            }
            self.identity_epoch.fetch_add(1, Ordering::SeqCst);
            f(snapshot);
            true
        })
    }

    /// Apply `f` only if no identity switch happened since `epoch`.
    pub fn update_for_identity(&self, epoch: u64, f: impl FnOnce(&mut AuthSnapshot)) -> bool {
        self.snapshot.send_if_modified(|snapshot| {
            if self.identity_epoch() != epoch {
                return false;
            }
            f(snapshot);
            true
        })
    }

    /// Explicit disconnect: advance the wallet epoch and apply `f` under the
    /// same lock.
    pub fn reset_wallet(&self, f: impl FnOnce(&mut AuthSnapshot)) {
        self.snapshot.send_modify(|snapshot| {
            self.wallet_epoch.fetch_add(1, Ordering::SeqCst);
            f(snapshot);
        });
    }

    /// Apply `f` only if no disconnect happened since `epoch`. `f` reports
    /// whether it changed anything.
    pub fn update_for_wallet(&self, epoch: u64, f: impl FnOnce(&mut AuthSnapshot) -> bool) -> bool {
        self.snapshot.send_if_modified(|snapshot| {
            if self.wallet_epoch() != epoch {
                return false;
            }
            f(snapshot)
        })
    }

    /// Sign-out: both epochs advance and the snapshot resets.
    pub fn reset_all(&self) {
        self.snapshot.send_modify(|snapshot| {
            self.identity_epoch.fetch_add(1, Ordering::SeqCst);
            self.wallet_epoch.fetch_add(1, Ordering::SeqCst);
            *snapshot = AuthSnapshot::signed_out();
        });
    }

    /// Profile row that wallet mirror writes target: the active identity,
    /// else the wallet provider's own user.
    pub fn mirror_target(&self) -> Option<String> {
        if let Some(id) = self.snapshot.borrow().identity.id() {
            return Some(id.to_string());
        }
        self.wallets.state().user.map(|user| user.id)
    }
}
