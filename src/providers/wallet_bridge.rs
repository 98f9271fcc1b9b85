// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet provider backed by state the browser publishes.
//!
//! The hosted wallet SDK only runs in the browser. The front end mirrors its
//! readiness flags, user and wallet list to `PUT /v1/wallet/provider`, which
//! lands in [`WalletBridge::publish`]. A login request is signalled back
//! through `login_requested` so the front end opens the provider modal; a
//! modal that closes without a wallet comes back as `login_error`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{ProviderError, WalletProvider, WalletProviderState};

#[derive(Clone)]
pub struct WalletBridge {
    state: Arc<watch::Sender<WalletProviderState>>,
}

impl WalletBridge {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WalletProviderState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Replace the provider state with what the browser reports.
    pub fn publish(&self, state: WalletProviderState) {
        debug!(
            ready = state.ready,
            authenticated = state.authenticated,
            wallets_ready = state.wallets_ready,
            wallets = state.wallets.len(),
            "Wallet provider state published"
        );
        self.state.send_replace(state);
    }
}

impl Default for WalletBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for WalletBridge {
    fn state(&self) -> WalletProviderState {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<WalletProviderState> {
        self.state.subscribe()
    }

    async fn login(&self) -> Result<(), ProviderError> {
        if !self.state.borrow().ready {
            return Err(ProviderError::WalletUnavailable(
                "wallet provider has not finished initializing".to_string(),
            ));
        }
        self.state.send_if_modified(|state| {
            let changed = !state.login_requested || state.login_error.is_some();
            state.login_requested = true;
            state.login_error = None;
            changed
        });
        Ok(())
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        self.state.send_modify(|state| {
            state.authenticated = false;
            state.user = None;
            state.wallets.clear();
            state.login_requested = false;
            state.login_error = None;
        });
        Ok(())
    }
}
