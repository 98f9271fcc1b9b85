// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Connection Manager
//!
//! Tracks which wallet the user has connected and keeps the profile row's
//! `connected_wallet_type` / `connected_wallet_address` columns in step with
//! it.
//!
//! ## Transitions
//!
//! ```text
//! Disconnected --connect--> Pending --provider reports wallet--> Connected
//!                              |
//!                              +--login fails--> previous state + notice
//! any --disconnect--> Disconnected
//! ```
//!
//! The provider is the source of truth once it has finished loading its
//! wallet list. Before that, the persisted profile columns stand in for it
//! so a reload does not flash "disconnected".

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    error::AuthError,
    state::{AuthSnapshot, Shared, WalletConnectionState, WalletNotice},
};
use crate::models::{ProfileUpdate, WalletType};
use crate::providers::{ConnectedWallet, ProviderError, WalletLoginError, WalletProviderState};

/// Wallet type for a provider chain identifier.
///
/// `solana*` chains map to Solana. Everything else, Bitcoin chains and an
/// unknown chain included, is treated as Ethereum.
pub fn wallet_type_for_chain(chain_id: Option<&str>) -> WalletType {
    match chain_id {
        Some(chain) if chain.starts_with("solana") => WalletType::Solana,
        _ => WalletType::Ethereum,
    }
}

fn notice_for(wallet_type: WalletType, error: &ProviderError) -> WalletNotice {
    let cancelled = match error {
        ProviderError::UserRejected => true,
        other => other.to_string().contains("User rejected"),
    };
    if cancelled {
        WalletNotice::Cancelled { wallet_type }
    } else {
        WalletNotice::Unavailable { wallet_type }
    }
}

/// Undo a pending connect. Returns false when no connect is pending.
fn roll_back_pending(snapshot: &mut AuthSnapshot) -> bool {
    if !snapshot.wallet.is_pending() {
        return false;
    }
    snapshot.wallet = snapshot.wallet_before_connect.take().unwrap_or_default();
    true
}

fn set_profile_wallet(snapshot: &mut AuthSnapshot, update: &ProfileUpdate) {
    if let Some(profile) = snapshot.profile.as_mut() {
        update.apply_to(profile);
    }
}

/// Owns [`WalletConnectionState`] transitions.
#[derive(Clone)]
pub struct WalletConnectionManager {
    shared: Arc<Shared>,
}

impl WalletConnectionManager {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> WalletConnectionState {
        self.shared.snapshot().wallet
    }

    /// Begin a connect.
    ///
    /// The state goes to `Pending` before the provider is asked to log in;
    /// the address arrives later through the provider's state updates. On
    /// failure the previous state is restored and a notice is left for the
    /// UI, unless a disconnect happened in the meantime.
    pub async fn connect_wallet(&self, wallet_type: WalletType) -> Result<(), AuthError> {
        let epoch = self.shared.wallet_epoch();
        self.shared.update(|snapshot| {
            let previous = std::mem::replace(
                &mut snapshot.wallet,
                WalletConnectionState::Pending { wallet_type },
            );
            // A repeated connect keeps the state from before the first one.
            if !previous.is_pending() {
                snapshot.wallet_before_connect = Some(previous);
            }
            snapshot.wallet_notice = None;
        });
        info!(wallet_type = %wallet_type, "Wallet connect requested");

        if let Err(error) = self.shared.wallets.login().await {
            let notice = notice_for(wallet_type, &error);
            warn!(wallet_type = %wallet_type, error = %error, "Wallet connect failed");

            let rolled_back = self.shared.update_for_wallet(epoch, |snapshot| {
                roll_back_pending(snapshot);
                snapshot.wallet_notice = Some(notice.clone());
                true
            });
            if !rolled_back {
                debug!("Wallet disconnected while connect was in flight");
            }
            return Err(AuthError::WalletConnectFailed(notice));
        }

        // Already-connected providers will not report a change.
        let provider = self.shared.wallets.state();
        if let Some(wallet) = provider.primary_wallet().filter(|_| provider.has_live_wallet()) {
            self.apply_live_wallet(epoch, wallet).await;
        }
        Ok(())
    }

    /// Clear the connection locally and in the profile row.
    ///
    /// Always succeeds locally and wins over any connect still in flight.
    /// The provider's own session is left alone.
    pub async fn disconnect_wallet(&self) {
        self.shared.reset_wallet(|snapshot| {
            snapshot.wallet = WalletConnectionState::Disconnected;
            snapshot.wallet_before_connect = None;
            snapshot.wallet_notice = None;
            set_profile_wallet(snapshot, &ProfileUpdate::clear_wallet());
        });
        info!("Wallet disconnected");
        self.mirror(ProfileUpdate::clear_wallet()).await;
    }

    pub fn dismiss_notice(&self) {
        self.shared.update_if(|snapshot| snapshot.wallet_notice.take().is_some());
    }

    /// React to a wallet provider state change.
    pub(crate) async fn on_provider_state(&self, epoch: u64, state: &WalletProviderState) {
        if let Some(error) = &state.login_error {
            self.apply_login_error(epoch, error);
        }
        if let Some(wallet) = state.primary_wallet().filter(|_| state.has_live_wallet()) {
            self.apply_live_wallet(epoch, wallet).await;
        } else if state.confirms_no_wallet() {
            self.apply_no_wallet(epoch).await;
        }
    }

    /// Settle wallet state after a profile was loaded for a new identity.
    pub(crate) async fn on_profile_loaded(&self) {
        let epoch = self.shared.wallet_epoch();
        let provider = self.shared.wallets.state();
        if let Some(wallet) = provider.primary_wallet().filter(|_| provider.has_live_wallet()) {
            self.apply_live_wallet(epoch, wallet).await;
        } else if provider.confirms_no_wallet() {
            self.apply_no_wallet(epoch).await;
        } else {
            self.apply_persisted_wallet(epoch);
        }
    }

    async fn apply_live_wallet(&self, epoch: u64, wallet: &ConnectedWallet) {
        let wallet_type = wallet_type_for_chain(wallet.chain_id.as_deref());
        let next = WalletConnectionState::Connected {
            wallet_type,
            address: wallet.address.clone(),
        };
        let update = ProfileUpdate::wallet(wallet_type, wallet.address.clone());

        let mut mirror = false;
        self.shared.update_for_wallet(epoch, |snapshot| {
            let stale_profile = snapshot.profile.as_ref().is_some_and(|profile| {
                profile.persisted_wallet() != Some((wallet_type, wallet.address.as_str()))
            });
            let changed = snapshot.wallet != next;
            if !changed && !stale_profile {
                return false;
            }
            snapshot.wallet = next;
            snapshot.wallet_before_connect = None;
            snapshot.wallet_notice = None;
            set_profile_wallet(snapshot, &update);
            mirror = true;
            true
        });

        if mirror {
            info!(
                wallet_type = %wallet_type,
                address = %wallet.address,
                "Wallet connected"
            );
            self.mirror(update).await;
        }
    }

    /// The front end reports that the login it was asked for failed. Only a
    /// pending connect is affected; the notice matches the failure.
    fn apply_login_error(&self, epoch: u64, error: &WalletLoginError) {
        let error = ProviderError::from(error);
        let mut notice = None;
        self.shared.update_for_wallet(epoch, |snapshot| {
            let wallet_type = match &snapshot.wallet {
                WalletConnectionState::Pending { wallet_type } => *wallet_type,
                _ => return false,
            };
            roll_back_pending(snapshot);
            let reported = notice_for(wallet_type, &error);
            snapshot.wallet_notice = Some(reported.clone());
            notice = Some(reported);
            true
        });

        if let Some(notice) = notice {
            warn!(
                wallet_type = %notice.wallet_type(),
                error = %error,
                "Wallet connect failed in the provider"
            );
        }
    }

    async fn apply_no_wallet(&self, epoch: u64) {
        let mut mirror = false;
        self.shared.update_for_wallet(epoch, |snapshot| {
            let stale_profile = snapshot
                .profile
                .as_ref()
                .is_some_and(|profile| profile.persisted_wallet().is_some());
            let connected = matches!(snapshot.wallet, WalletConnectionState::Connected { .. });
            if !connected && !stale_profile {
                return false;
            }
            if connected {
                snapshot.wallet = WalletConnectionState::Disconnected;
            }
            set_profile_wallet(snapshot, &ProfileUpdate::clear_wallet());
            mirror = true;
            true
        });

        if mirror {
            info!("Wallet provider reports no connected wallet");
            self.mirror(ProfileUpdate::clear_wallet()).await;
        }
    }

    /// Fallback read: the provider has not loaded yet, show what the profile
    /// row remembers.
    fn apply_persisted_wallet(&self, epoch: u64) {
        self.shared.update_for_wallet(epoch, |snapshot| {
            if snapshot.wallet != WalletConnectionState::Disconnected {
                return false;
            }
            let Some((wallet_type, address)) = snapshot
                .profile
                .as_ref()
                .and_then(|profile| profile.persisted_wallet())
                .map(|(wallet_type, address)| (wallet_type, address.to_string()))
            else {
                return false;
            };
            debug!(wallet_type = %wallet_type, "Restored wallet from profile");
            snapshot.wallet = WalletConnectionState::Connected {
                wallet_type,
                address,
            };
            true
        });
    }

    /// Best-effort write of the wallet columns. Failures are logged only.
    async fn mirror(&self, update: ProfileUpdate) {
        let Some(target) = self.shared.mirror_target() else {
            debug!("No profile to mirror wallet state to");
            return;
        };
        match self.shared.profiles.update_profile(&target, &update).await {
            Ok(()) => debug!(user_id = %target, "Mirrored wallet state to profile"),
            Err(error) => {
                let error = AuthError::RepositoryWriteFailed(error);
                warn!(user_id = %target, error = %error, "Failed to mirror wallet state");
            }
        }
    }
}
