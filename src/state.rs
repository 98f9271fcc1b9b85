// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthContext, AuthSnapshot};
use crate::config::DEFAULT_SETTLE_TIMEOUT;
use crate::ledger::Ledger;
use crate::providers::{InMemoryProfileRepository, InMemorySessionStore, WalletBridge};

/// Which backend serves sessions and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Hosted,
    InMemory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Hosted => "hosted",
            Backend::InMemory => "in_memory",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthContext,
    pub ledger: Ledger,
    /// Receives wallet provider state from the browser.
    pub wallet_bridge: WalletBridge,
    pub backend: Backend,
    /// How long credential handlers wait for the profile load.
    pub settle_timeout: Duration,
}

impl AppState {
    pub fn new(
        auth: AuthContext,
        wallet_bridge: WalletBridge,
        backend: Backend,
        settle_timeout: Duration,
    ) -> Self {
        Self {
            ledger: Ledger::new(auth.clone()),
            auth,
            wallet_bridge,
            backend,
            settle_timeout,
        }
    }

    /// State over the in-process backend, already initialized.
    pub async fn in_memory() -> Self {
        let wallet_bridge = WalletBridge::new();
        let auth = AuthContext::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(wallet_bridge.clone()),
            Arc::new(InMemoryProfileRepository::new()),
        );
        auth.init().await;
        Self::new(auth, wallet_bridge, Backend::InMemory, DEFAULT_SETTLE_TIMEOUT)
    }

    /// Settled snapshot, or the current one if settling takes too long.
    pub async fn settled_snapshot(&self) -> AuthSnapshot {
        match tokio::time::timeout(self.settle_timeout, self.auth.settled()).await {
            Ok(snapshot) => snapshot,
            Err(_) => self.auth.snapshot(),
        }
    }
}
