// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Refresher
//!
//! Background task that exchanges the hosted session's refresh token shortly
//! before the access token expires. Each successful refresh is broadcast as
//! a token-refreshed session event, which the auth context applies like any
//! other session change.
//!
//! ## Strategy
//!
//! Every `check_interval` (default 30 s) the refresher reads the session's
//! expiry and refreshes once fewer than `refresh_margin` seconds (default
//! 60 s) remain. A rejected refresh signs the session out; transport errors
//! are retried on the next tick.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::providers::{ProviderError, SupabaseClient};

/// Default interval between expiry checks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Refresh when fewer than this many seconds remain.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// A session whose access token can be renewed.
#[async_trait]
pub trait RefreshableSession: Send + Sync {
    /// Unix timestamp at which the current access token expires.
    async fn expires_at(&self) -> Option<i64>;

    async fn refresh(&self) -> Result<(), ProviderError>;
}

#[async_trait]
impl RefreshableSession for SupabaseClient {
    async fn expires_at(&self) -> Option<i64> {
        self.session_expires_at().await
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        self.refresh_session().await.map(|_| ())
    }
}

/// Whether a token expiring at `expires_at` should be refreshed at `now`.
pub fn needs_refresh(expires_at: Option<i64>, now: i64, margin_secs: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now <= margin_secs,
        None => false,
    }
}

pub struct SessionRefresher {
    session: Arc<dyn RefreshableSession>,
    check_interval: Duration,
    refresh_margin_secs: i64,
}

impl SessionRefresher {
    pub fn new(session: Arc<dyn RefreshableSession>) -> Self {
        Self {
            session,
            check_interval: DEFAULT_CHECK_INTERVAL,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            margin_secs = self.refresh_margin_secs,
            "Session refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Session refresher shutting down");
                return;
            }

            self.check_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session refresher shutting down");
                    return;
                }
            }
        }
    }

    /// One check: refresh if the token is about to expire.
    async fn check_step(&self) {
        let expires_at = self.session.expires_at().await;
        if !needs_refresh(expires_at, Utc::now().timestamp(), self.refresh_margin_secs) {
            return;
        }

        match self.session.refresh().await {
            Ok(()) => debug!("Session refreshed"),
            Err(ProviderError::Rejected(message)) => {
                warn!(error = %message, "Session refresh rejected; session ended");
            }
            Err(e) => warn!(error = %e, "Session refresh failed; will retry"),
        }
    }
}
