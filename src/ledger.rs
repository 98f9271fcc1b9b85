// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger
//!
//! Donations, token purchases, per-user history and the community
//! leaderboard. Every entry is appended to the `transactions` table and
//! folded into the profile's running totals and CareLevel score.
//!
//! | Operation | Total | Score |
//! |-----------|-------|-------|
//! | donation  | `total_donated += amount` | `+ amount * 150` |
//! | purchase  | `total_purchased += amount` | `+ amount * 100` |

use tracing::info;

use crate::auth::{AuthContext, AuthError};
use crate::models::{
    DonationRequest, NewTransaction, Profile, ProfileUpdate, PurchaseRequest, Transaction,
    TransactionKind, TxStatus,
};
use crate::providers::RepositoryError;

pub const DEFAULT_TOKEN: &str = "SOL";
pub const DEFAULT_RECIPIENT: &str = "CareLevel Community";
pub const DEFAULT_PURCHASE_AMOUNT: f64 = 100.0;
pub const DONATION_SCORE_MULTIPLIER: f64 = 150.0;
pub const PURCHASE_SCORE_MULTIPLIER: f64 = 100.0;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Amount must be a positive number")]
    InvalidAmount,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a recorded donation or purchase.
#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct Receipt {
    pub transaction: Transaction,
    /// Profile as reloaded after the totals were updated.
    pub profile: Profile,
}

fn validate_amount(amount: f64) -> Result<f64, LedgerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount)
    }
}

fn token_or_default(token: Option<String>) -> String {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TOKEN.to_string())
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Clone)]
pub struct Ledger {
    auth: AuthContext,
}

impl Ledger {
    pub fn new(auth: AuthContext) -> Self {
        Self { auth }
    }

    /// The loaded profile of the active identity.
    fn current_profile(&self) -> Result<Profile, LedgerError> {
        let snapshot = self.auth.snapshot();
        if !snapshot.identity.is_authenticated() {
            return Err(AuthError::NotAuthenticated.into());
        }
        snapshot
            .profile
            .ok_or_else(|| AuthError::ProfileMissing.into())
    }

    pub async fn donate(&self, request: DonationRequest) -> Result<Receipt, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let profile = self.current_profile()?;
        let recipient = request
            .recipient
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string());

        let transaction = NewTransaction {
            user_id: profile.id.clone(),
            kind: TransactionKind::Donation,
            amount,
            token_type: token_or_default(request.token_type),
            recipient: Some(recipient),
            status: TxStatus::Success,
        };
        let update = ProfileUpdate {
            total_donated: Some(profile.total_donated + amount),
            carelevel_score: Some(profile.carelevel_score + amount * DONATION_SCORE_MULTIPLIER),
            ..ProfileUpdate::default()
        };
        self.record(transaction, update).await
    }

    pub async fn purchase(&self, request: PurchaseRequest) -> Result<Receipt, LedgerError> {
        let amount = validate_amount(request.amount.unwrap_or(DEFAULT_PURCHASE_AMOUNT))?;
        let profile = self.current_profile()?;

        let transaction = NewTransaction {
            user_id: profile.id.clone(),
            kind: TransactionKind::Purchase,
            amount,
            token_type: token_or_default(request.token_type),
            recipient: None,
            status: TxStatus::Success,
        };
        let update = ProfileUpdate {
            total_purchased: Some(profile.total_purchased + amount),
            carelevel_score: Some(profile.carelevel_score + amount * PURCHASE_SCORE_MULTIPLIER),
            ..ProfileUpdate::default()
        };
        self.record(transaction, update).await
    }

    async fn record(
        &self,
        transaction: NewTransaction,
        update: ProfileUpdate,
    ) -> Result<Receipt, LedgerError> {
        let profiles = self.auth.profiles();
        let transaction = profiles.insert_transaction(&transaction).await?;
        info!(
            user_id = %transaction.user_id,
            kind = ?transaction.kind,
            amount = transaction.amount,
            token = %transaction.token_type,
            "Recorded transaction"
        );

        let profile = self.auth.update_profile(update).await?;
        Ok(Receipt {
            transaction,
            profile,
        })
    }

    /// The active identity's transactions, newest first.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<Transaction>, LedgerError> {
        let identity = self.auth.identity();
        let user_id = identity.id().ok_or(AuthError::NotAuthenticated)?;
        let limit = clamp_limit(limit, DEFAULT_HISTORY_LIMIT);
        Ok(self.auth.profiles().list_transactions(user_id, limit).await?)
    }

    /// Profiles ordered by CareLevel score, highest first.
    pub async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<Profile>, LedgerError> {
        let limit = clamp_limit(limit, DEFAULT_LEADERBOARD_LIMIT);
        Ok(self.auth.profiles().top_profiles(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use crate::providers::{InMemoryProfileRepository, InMemorySessionStore, WalletBridge};

    async fn signed_in(email: &str) -> (Ledger, AuthContext) {
        let auth = AuthContext::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(WalletBridge::new()),
            Arc::new(InMemoryProfileRepository::new()),
        );
        auth.init().await;
        auth.sign_up(email, "secret1", "", "").await.unwrap();
        let mut receiver = auth.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            receiver.wait_for(|s| s.profile.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        (Ledger::new(auth.clone()), auth)
    }

    #[test]
    fn amount_validation() {
        assert_eq!(validate_amount(1.5), Ok(1.5));
        assert_eq!(validate_amount(0.0), Err(LedgerError::InvalidAmount));
        assert_eq!(validate_amount(-3.0), Err(LedgerError::InvalidAmount));
        assert_eq!(validate_amount(f64::NAN), Err(LedgerError::InvalidAmount));
        assert_eq!(validate_amount(f64::INFINITY), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 10), 10);
        assert_eq!(clamp_limit(Some(0), 10), 1);
        assert_eq!(clamp_limit(Some(5000), 10), MAX_LIST_LIMIT);
    }

    #[tokio::test]
    async fn donate_requires_identity() {
        let auth = AuthContext::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(WalletBridge::new()),
            Arc::new(InMemoryProfileRepository::new()),
        );
        auth.init().await;
        let ledger = Ledger::new(auth);

        let err = ledger
            .donate(DonationRequest {
                amount: 1.0,
                token_type: None,
                recipient: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Auth(AuthError::NotAuthenticated));
        assert!(ledger.history(None).await.is_err());
    }

    #[tokio::test]
    async fn donation_updates_totals_and_score() {
        let (ledger, auth) = signed_in("giver@care.org").await;

        let receipt = ledger
            .donate(DonationRequest {
                amount: 2.0,
                token_type: None,
                recipient: None,
            })
            .await
            .unwrap();

        assert_eq!(receipt.transaction.kind, TransactionKind::Donation);
        assert_eq!(receipt.transaction.token_type, "SOL");
        assert_eq!(
            receipt.transaction.recipient.as_deref(),
            Some("CareLevel Community")
        );
        assert_eq!(receipt.transaction.status, TxStatus::Success);
        assert_eq!(receipt.profile.total_donated, 2.0);
        assert_eq!(receipt.profile.carelevel_score, 300.0);
        assert_eq!(auth.profile().unwrap().carelevel_score, 300.0);
    }

    #[tokio::test]
    async fn purchase_defaults_to_one_hundred_tokens() {
        let (ledger, _auth) = signed_in("buyer@care.org").await;

        let receipt = ledger.purchase(PurchaseRequest::default()).await.unwrap();
        assert_eq!(receipt.transaction.amount, 100.0);
        assert_eq!(receipt.transaction.recipient, None);
        assert_eq!(receipt.profile.total_purchased, 100.0);
        assert_eq!(receipt.profile.carelevel_score, 10_000.0);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_leaderboard_by_score() {
        let (ledger, _auth) = signed_in("h@care.org").await;
        for amount in [1.0, 2.0, 3.0] {
            ledger
                .donate(DonationRequest {
                    amount,
                    token_type: Some("USDC".into()),
                    recipient: Some("Ocean Fund".into()),
                })
                .await
                .unwrap();
        }

        let history = ledger.history(Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 3.0);
        assert_eq!(history[1].amount, 2.0);
        assert_eq!(history[0].token_type, "USDC");

        let leaders = ledger.leaderboard(None).await.unwrap();
        assert_eq!(leaders[0].username, "h");
        assert_eq!(leaders[0].carelevel_score, 900.0);
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected_before_writing() {
        let (ledger, _auth) = signed_in("z@care.org").await;
        let err = ledger
            .purchase(PurchaseRequest {
                amount: Some(-5.0),
                token_type: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount);
        assert!(ledger.history(None).await.unwrap().is_empty());
    }
}
