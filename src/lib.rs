// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CareLevel - Community Auth & Wallet Session Service
//!
//! This crate reconciles a hosted email/password session and a hosted wallet
//! login into one identity, keeps the user's profile row in sync with the
//! connected wallet, and serves the result to the CareLevel front end.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Identity reconciler and wallet connection manager
//! - `ledger` - Donations, purchases and the CareLevel leaderboard
//! - `providers` - Hosted auth, wallet and row store collaborators
//! - `session_refresher` - Background access token refresh

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod providers;
pub mod session_refresher;
pub mod state;
