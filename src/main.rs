// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use carelevel_server::{
    api::router,
    auth::AuthContext,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    providers::{InMemoryProfileRepository, InMemorySessionStore, SupabaseClient, WalletBridge},
    session_refresher::SessionRefresher,
    state::{AppState, Backend},
};

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    let shutdown = CancellationToken::new();
    let wallet_bridge = WalletBridge::new();

    let hosted = match SupabaseClient::from_config(&config) {
        Ok(client) => client.map(Arc::new),
        Err(e) => {
            error!(error = %e, "Failed to build hosted backend client");
            std::process::exit(1);
        }
    };

    let (auth, backend) = match hosted {
        Some(client) => {
            info!("Using hosted backend");
            tokio::spawn(SessionRefresher::new(client.clone()).run(shutdown.clone()));
            let auth = AuthContext::new(
                client.clone(),
                Arc::new(wallet_bridge.clone()),
                client,
            );
            (auth, Backend::Hosted)
        }
        None => {
            warn!("Hosted backend not configured; sessions and profiles are kept in memory");
            let auth = AuthContext::new(
                Arc::new(InMemorySessionStore::new()),
                Arc::new(wallet_bridge.clone()),
                Arc::new(InMemoryProfileRepository::new()),
            );
            (auth, Backend::InMemory)
        }
    };
    auth.init().await;

    let state = AppState::new(
        auth.clone(),
        wallet_bridge,
        backend,
        config.settle_timeout,
    );
    let app = router(state);

    let addr = config.bind_address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind");
            std::process::exit(1);
        }
    };

    info!(
        addr = %addr,
        backend = backend.as_str(),
        "CareLevel server listening (docs at /docs)"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server failed");
    }

    shutdown.cancel();
    auth.dispose();
    info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
