// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Merges two independent auth sources into one logical user:
//!
//! - a password session from the hosted auth service
//! - a wallet login from the hosted wallet provider
//!
//! ## Flow
//!
//! 1. [`AuthContext::init`] restores any session and starts the event loop
//! 2. Session events and wallet provider updates are applied in arrival order
//! 3. Every identity change triggers a profile load; missing rows are created
//! 4. The wallet connection follows the provider once it is ready, and is
//!    mirrored into the profile row
//!
//! ## Precedence
//!
//! - A password session is always primary
//! - A wallet user becomes the identity only when no session is active
//! - An explicit disconnect always beats a connect still in flight

pub mod context;
pub mod error;
pub mod identity;
pub mod reconciler;
pub mod state;
pub mod wallet;

pub use context::AuthContext;
pub use error::AuthError;
pub use identity::Identity;
pub use reconciler::IdentityReconciler;
pub use state::{AuthSnapshot, WalletConnectionState, WalletNotice};
pub use wallet::{wallet_type_for_chain, WalletConnectionManager};
