// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The logical current user.

use serde::Serialize;

use crate::models::{email_local_part, NewProfile};
use crate::providers::{SessionUser, WalletUser};

/// Which auth source is authoritative right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Identity {
    #[default]
    Anonymous,
    /// Signed in with email and password.
    Session(SessionUser),
    /// Signed in through the wallet provider only.
    Wallet(WalletUser),
}

impl Identity {
    /// Profile key of the identity.
    pub fn id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Session(user) => Some(&user.id),
            Identity::Wallet(user) => Some(&user.id),
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Session(user) => user.email.as_deref(),
            Identity::Wallet(user) => user.email_address(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Identity::Anonymous)
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Identity::Session(_))
    }
}

/// Profile row created on a wallet user's first sync.
///
/// Names come from the user's email when there is one, otherwise from the
/// first eight characters of the provider user id.
pub fn wallet_profile(user: &WalletUser) -> NewProfile {
    let email = user.email_address();
    let username = match email {
        Some(email) => email_local_part(email).to_string(),
        None => format!("user_{}", user.id.chars().take(8).collect::<String>()),
    };
    let full_name = user
        .linked_email_name()
        .map(str::to_string)
        .unwrap_or_else(|| username.clone());

    NewProfile {
        id: user.id.clone(),
        username,
        full_name,
        mail_address: email.map(str::to_string),
    }
}
