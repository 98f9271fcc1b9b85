// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! Row types of the hosted `profiles` and `transactions` tables, plus the
//! request bodies accepted by the HTTP API. All types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for automatic JSON handling and OpenAPI
//! documentation.
//!
//! ## Model Categories
//!
//! - **Wallets**: [`WalletType`], the three chains a profile can be linked to
//! - **Profiles**: [`Profile`], [`NewProfile`], [`ProfileUpdate`]
//! - **Transactions**: [`Transaction`], [`NewTransaction`] (append-only ledger)

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Wallet Type
// =============================================================================

/// Chain family of a connected wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Solana,
    Ethereum,
    Bitcoin,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Solana => "solana",
            WalletType::Ethereum => "ethereum",
            WalletType::Bitcoin => "bitcoin",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "solana" => Ok(WalletType::Solana),
            "ethereum" => Ok(WalletType::Ethereum),
            "bitcoin" => Ok(WalletType::Bitcoin),
            other => Err(format!("unknown wallet type '{other}'")),
        }
    }
}

// =============================================================================
// Profile Models
// =============================================================================

/// A row of the `profiles` table, keyed by identity id.
///
/// The wallet columns are the durable record of "a wallet is linked to this
/// account"; they survive reloads while the wallet provider's own state does
/// not.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Profile {
    /// Identity id (hosted auth user id or wallet provider user id).
    pub id: String,
    pub username: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_url: Option<String>,
    #[serde(default)]
    pub connected_wallet_type: Option<WalletType>,
    #[serde(default)]
    pub connected_wallet_address: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub total_donated: f64,
    #[serde(default)]
    pub total_purchased: f64,
    #[serde(default)]
    pub carelevel_score: f64,
}

impl Profile {
    /// The persisted wallet link, only when both columns are set.
    pub fn persisted_wallet(&self) -> Option<(WalletType, &str)> {
        match (self.connected_wallet_type, self.connected_wallet_address.as_deref()) {
            (Some(wallet_type), Some(address)) if !address.is_empty() => {
                Some((wallet_type, address))
            }
            _ => None,
        }
    }
}

/// Insert payload for a lazily created profile row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct NewProfile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_address: Option<String>,
}

impl NewProfile {
    /// Profile for a password account: username and full name both default
    /// to the email's local part.
    pub fn from_email(id: impl Into<String>, email: &str) -> Self {
        let username = email_local_part(email).to_string();
        Self {
            id: id.into(),
            full_name: username.clone(),
            username,
            mail_address: Some(email.to_string()),
        }
    }

    /// Row as it would read back after insert, with repository defaults.
    pub fn into_profile(self, now: DateTime<Utc>) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            full_name: self.full_name,
            mail_address: self.mail_address,
            avatar_url: None,
            bio: None,
            category: None,
            website: None,
            x_url: None,
            connected_wallet_type: None,
            connected_wallet_address: None,
            created_at: now,
            updated_at: now,
            total_donated: 0.0,
            total_purchased: 0.0,
            carelevel_score: 0.0,
        }
    }
}

/// Local part of an email address (`a@b.com` -> `a`).
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Columns that older `profiles` schemas may lack.
pub const OPTIONAL_PROFILE_COLUMNS: [&str; 2] = ["website", "x_url"];

/// Partial update of a profile row.
///
/// `None` leaves a column untouched. The wallet columns are double options so
/// that `Some(None)` serializes as an explicit `null` and clears the column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<WalletType>)]
    pub connected_wallet_type: Option<Option<WalletType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub connected_wallet_address: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_donated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_purchased: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carelevel_score: Option<f64>,
}

impl ProfileUpdate {
    /// Update that links a wallet.
    pub fn wallet(wallet_type: WalletType, address: impl Into<String>) -> Self {
        Self {
            connected_wallet_type: Some(Some(wallet_type)),
            connected_wallet_address: Some(Some(address.into())),
            ..Self::default()
        }
    }

    /// Update that clears the wallet link.
    pub fn clear_wallet() -> Self {
        Self {
            connected_wallet_type: Some(None),
            connected_wallet_address: Some(None),
            ..Self::default()
        }
    }

    /// Names of the columns this update writes.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        let mut push = |set: bool, name: &'static str| {
            if set {
                columns.push(name);
            }
        };
        push(self.username.is_some(), "username");
        push(self.full_name.is_some(), "full_name");
        push(self.mail_address.is_some(), "mail_address");
        push(self.avatar_url.is_some(), "avatar_url");
        push(self.bio.is_some(), "bio");
        push(self.category.is_some(), "category");
        push(self.website.is_some(), "website");
        push(self.x_url.is_some(), "x_url");
        push(self.connected_wallet_type.is_some(), "connected_wallet_type");
        push(
            self.connected_wallet_address.is_some(),
            "connected_wallet_address",
        );
        push(self.total_donated.is_some(), "total_donated");
        push(self.total_purchased.is_some(), "total_purchased");
        push(self.carelevel_score.is_some(), "carelevel_score");
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns().is_empty()
    }

    /// Drop the columns listed in [`OPTIONAL_PROFILE_COLUMNS`].
    pub fn without_optional_columns(mut self) -> Self {
        self.website = None;
        self.x_url = None;
        self
    }

    /// Apply this update to an in-memory row.
    pub fn apply_to(&self, profile: &mut Profile) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        set(&mut profile.username, &self.username);
        set(&mut profile.full_name, &self.full_name);
        set_opt(&mut profile.mail_address, &self.mail_address);
        set_opt(&mut profile.avatar_url, &self.avatar_url);
        set_opt(&mut profile.bio, &self.bio);
        set_opt(&mut profile.category, &self.category);
        set_opt(&mut profile.website, &self.website);
        set_opt(&mut profile.x_url, &self.x_url);
        set(&mut profile.connected_wallet_type, &self.connected_wallet_type);
        set(
            &mut profile.connected_wallet_address,
            &self.connected_wallet_address,
        );
        set(&mut profile.total_donated, &self.total_donated);
        set(&mut profile.total_purchased, &self.total_purchased);
        set(&mut profile.carelevel_score, &self.carelevel_score);
    }
}

// =============================================================================
// Transaction Models
// =============================================================================

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Donation,
    Purchase,
}

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// A row of the append-only `transactions` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub status: TxStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a transaction row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct NewTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub status: TxStatus,
}

// =============================================================================
// Request Models
// =============================================================================

/// Profile fields a user may edit directly.
///
/// Wallet columns and ledger totals are owned by the wallet manager and the
/// ledger and cannot be written through this request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileEditRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub x_url: Option<String>,
}

impl From<ProfileEditRequest> for ProfileUpdate {
    fn from(edit: ProfileEditRequest) -> Self {
        Self {
            username: edit.username,
            full_name: edit.full_name,
            avatar_url: edit.avatar_url,
            bio: edit.bio,
            category: edit.category,
            website: edit.website,
            x_url: edit.x_url,
            ..Self::default()
        }
    }
}

/// Request to create a password account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Accepted for form compatibility; the profile row takes its names
    /// from the email when it is first created.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

/// Request to sign in with email and password.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Request to start a wallet connection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectWalletRequest {
    pub wallet_type: WalletType,
}

/// Request to record a donation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonationRequest {
    pub amount: f64,
    /// Token symbol, `SOL` when omitted.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Recipient label, the community fund when omitted.
    #[serde(default)]
    pub recipient: Option<String>,
}

/// Request to record a token purchase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    /// Purchased amount, 100 when omitted.
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub token_type: Option<String>,
}
