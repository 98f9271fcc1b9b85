// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process backend.
//!
//! Used when no hosted backend is configured and by the test suites. Behaves
//! like the hosted services where the core depends on it: sign-up may leave
//! confirmation pending, session changes are broadcast, PATCH on a missing
//! row is a silent no-op, and columns can be declared missing to emulate an
//! older schema.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{
    ProfileRepository, ProviderError, RepositoryError, Session, SessionEvent, SessionStore,
    SessionUser, SignUpOutcome, SESSION_EVENT_CAPACITY,
};
use crate::models::{NewProfile, NewTransaction, Profile, ProfileUpdate, Transaction};

/// Minimum password length accepted on sign-up.
const MIN_PASSWORD_LEN: usize = 6;

/// Session lifetime handed out by the in-memory store.
const SESSION_TTL_SECS: i64 = 3600;

// =============================================================================
// Session Store
// =============================================================================

struct Account {
    user: SessionUser,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct Accounts {
    by_email: HashMap<String, Account>,
    session: Option<Session>,
}

pub struct InMemorySessionStore {
    accounts: RwLock<Accounts>,
    events: broadcast::Sender<SessionEvent>,
    require_confirmation: bool,
}

impl InMemorySessionStore {
    /// Store where sign-up starts a session right away.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            accounts: RwLock::new(Accounts::default()),
            events,
            require_confirmation: false,
        }
    }

    /// Store where sign-up leaves the account waiting for email confirmation.
    pub fn with_email_confirmation() -> Self {
        Self {
            require_confirmation: true,
            ..Self::new()
        }
    }

    /// Mark an account's email as confirmed.
    pub async fn confirm_email(&self, email: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        match accounts.by_email.get_mut(&normalize_email(email)) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    fn issue_session(user: &SessionUser) -> Session {
        Session {
            access_token: format!("mem-{}", Uuid::new_v4()),
            refresh_token: Some(format!("mem-refresh-{}", Uuid::new_v4())),
            expires_at: Some(Utc::now().timestamp() + SESSION_TTL_SECS),
            user: user.clone(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.accounts.read().await.session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(ProviderError::Rejected(
                "Unable to validate email address: invalid format".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ProviderError::Rejected(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters."
            )));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.by_email.contains_key(&email) {
            return Err(ProviderError::Rejected("User already registered".to_string()));
        }

        let user = SessionUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.clone()),
        };
        accounts.by_email.insert(
            email,
            Account {
                user: user.clone(),
                password: password.to_string(),
                confirmed: !self.require_confirmation,
            },
        );

        if self.require_confirmation {
            return Ok(SignUpOutcome {
                user: Some(user),
                session: None,
            });
        }

        let session = Self::issue_session(&user);
        accounts.session = Some(session.clone());
        drop(accounts);

        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(SignUpOutcome {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let mut accounts = self.accounts.write().await;
        let user = match accounts.by_email.get(&normalize_email(email)) {
            Some(account) if account.password == password => {
                if !account.confirmed {
                    return Err(ProviderError::Rejected("Email not confirmed".to_string()));
                }
                account.user.clone()
            }
            _ => {
                return Err(ProviderError::Rejected(
                    "Invalid login credentials".to_string(),
                ))
            }
        };

        let session = Self::issue_session(&user);
        accounts.session = Some(session.clone());
        drop(accounts);

        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let had_session = self.accounts.write().await.session.take().is_some();
        if had_session {
            self.emit(SessionEvent::SignedOut);
        }
        Ok(())
    }
}

// =============================================================================
// Profile Repository
// =============================================================================

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, Profile>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    tables: RwLock<Tables>,
    missing_columns: HashSet<String>,
    reject_profile_inserts: AtomicBool,
    reject_updates: AtomicBool,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate a `profiles` schema that lacks the given columns.
    pub fn with_missing_columns(columns: &[&str]) -> Self {
        Self {
            missing_columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Make profile inserts fail, as row-level security would for an
    /// unconfirmed account.
    pub fn set_reject_profile_inserts(&self, reject: bool) {
        self.reject_profile_inserts.store(reject, Ordering::SeqCst);
    }

    /// Make profile updates fail.
    pub fn set_reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    /// Insert or replace a row directly.
    pub async fn seed_profile(&self, profile: Profile) {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id.clone(), profile);
    }

    /// Read a row directly.
    pub async fn profile(&self, id: &str) -> Option<Profile> {
        self.tables.read().await.profiles.get(id).cloned()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>, RepositoryError> {
        Ok(self.tables.read().await.profiles.get(id).cloned())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, RepositoryError> {
        if self.reject_profile_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Request(
                "new row violates row-level security policy for table \"profiles\"".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(RepositoryError::Conflict(format!(
                "duplicate key value violates unique constraint \"profiles_pkey\" ({})",
                profile.id
            )));
        }
        let row = profile.clone().into_profile(Utc::now());
        tables.profiles.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Request(
                "profiles update rejected".to_string(),
            ));
        }
        if let Some(column) = update
            .columns()
            .into_iter()
            .find(|column| self.missing_columns.contains(*column))
        {
            return Err(RepositoryError::MissingColumn {
                table: "profiles".to_string(),
                column: column.to_string(),
            });
        }

        let mut tables = self.tables.write().await;
        if let Some(profile) = tables.profiles.get_mut(id) {
            update.apply_to(profile);
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn top_profiles(&self, limit: usize) -> Result<Vec<Profile>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Profile> = tables.profiles.values().cloned().collect();
        rows.sort_by(|a, b| b.carelevel_score.total_cmp(&a.carelevel_score));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Transaction> = tables
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first on equal timestamps.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        let row = Transaction {
            id: Uuid::new_v4().to_string(),
            user_id: transaction.user_id.clone(),
            kind: transaction.kind,
            amount: transaction.amount,
            token_type: transaction.token_type.clone(),
            recipient: transaction.recipient.clone(),
            status: transaction.status,
            created_at: Utc::now(),
        };
        self.tables.write().await.transactions.push(row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionKind, TxStatus};

    #[tokio::test]
    async fn sign_up_starts_session_and_broadcasts() {
        let store = InMemorySessionStore::new();
        let mut events = store.subscribe();

        let outcome = store.sign_up("A@b.com", "secret1").await.unwrap();

        let session = outcome.session.expect("session");
        assert_eq!(session.user.email.as_deref(), Some("a@b.com"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn(session.clone())
        );
        assert_eq!(store.current_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sign_up_with_confirmation_has_no_session() {
        let store = InMemorySessionStore::with_email_confirmation();
        let outcome = store.sign_up("a@b.com", "secret1").await.unwrap();
        assert!(outcome.user.is_some());
        assert!(outcome.session.is_none());

        let err = store
            .sign_in_with_password("a@b.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Rejected("Email not confirmed".into()));

        assert!(store.confirm_email("a@b.com").await);
        assert!(store.sign_in_with_password("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn sign_in_rejects_bad_password_and_short_passwords() {
        let store = InMemorySessionStore::new();
        assert!(store.sign_up("a@b.com", "123").await.is_err());
        store.sign_up("a@b.com", "secret1").await.unwrap();

        let err = store
            .sign_in_with_password("a@b.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn sign_out_without_session_is_silent() {
        let store = InMemorySessionStore::new();
        let mut events = store.subscribe();
        store.sign_out().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_reports_missing_column() {
        let repo = InMemoryProfileRepository::with_missing_columns(&["website"]);
        repo.insert_profile(&NewProfile::from_email("id", "a@b.com"))
            .await
            .unwrap();

        let err = repo
            .update_profile(
                "id",
                &ProfileUpdate {
                    website: Some("https://a.dev".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::MissingColumn {
                table: "profiles".into(),
                column: "website".into()
            }
        );
    }

    #[tokio::test]
    async fn duplicate_profile_insert_conflicts() {
        let repo = InMemoryProfileRepository::new();
        let row = NewProfile::from_email("id", "a@b.com");
        repo.insert_profile(&row).await.unwrap();
        assert!(matches!(
            repo.insert_profile(&row).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn transactions_are_listed_newest_first() {
        let repo = InMemoryProfileRepository::new();
        for amount in [1.0, 2.0, 3.0] {
            repo.insert_transaction(&NewTransaction {
                user_id: "u".into(),
                kind: TransactionKind::Donation,
                amount,
                token_type: "SOL".into(),
                recipient: None,
                status: TxStatus::Success,
            })
            .await
            .unwrap();
        }

        let rows = repo.list_transactions("u", 2).await.unwrap();
        let amounts: Vec<f64> = rows.iter().map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![3.0, 2.0]);
        assert!(repo.list_transactions("other", 10).await.unwrap().is_empty());
    }
}
