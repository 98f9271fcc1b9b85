// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Reconciler
//!
//! Merges the session store and the wallet provider into one identity and
//! one profile.
//!
//! - A session identity is primary. A wallet user is adopted only when no
//!   session identity is active.
//! - Profiles are loaded lazily after every identity change and created on
//!   first sight: password accounts get names from their email, wallet
//!   accounts from their email or provider id.
//! - Profile loads are tagged with the identity epoch at start; a load that
//!   finishes after the identity changed is dropped.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{
    error::AuthError,
    identity::{wallet_profile, Identity},
    state::Shared,
    wallet::WalletConnectionManager,
};
use crate::models::{NewProfile, Profile, ProfileUpdate, OPTIONAL_PROFILE_COLUMNS};
use crate::providers::{RepositoryError, SessionEvent, SessionUser, WalletUser};

/// Outcome of the post-login profile lookup.
enum ProfileLoad {
    Found(Profile),
    /// No row and nothing to create one from.
    Absent,
    /// No row and creating one failed.
    CreateFailed,
    Failed,
}

#[derive(Clone)]
pub struct IdentityReconciler {
    shared: Arc<Shared>,
    wallet: WalletConnectionManager,
}

impl IdentityReconciler {
    pub(crate) fn new(shared: Arc<Shared>, wallet: WalletConnectionManager) -> Self {
        Self { shared, wallet }
    }

    // =========================================================================
    // Session events
    // =========================================================================

    /// Apply whatever session the store currently holds.
    pub(crate) async fn restore(&self) {
        match self.shared.sessions.current_session().await {
            Ok(Some(session)) => self.apply_session_user(&session.user).await,
            Ok(None) => self.shared.update(|snapshot| snapshot.loading = false),
            Err(error) => {
                warn!(error = %error, "Failed to read current session");
                self.shared.update(|snapshot| snapshot.loading = false);
            }
        }
    }

    pub(crate) async fn handle_session_event(&self, event: SessionEvent) {
        match event.session() {
            Some(session) => self.apply_session_user(&session.user).await,
            None => self.end_session(),
        }
    }

    async fn apply_session_user(&self, user: &SessionUser) {
        let epoch = self.adopt_session(user);
        self.load_profile(user, epoch).await;
    }

    /// Make `user` the active identity. Returns the identity epoch that a
    /// profile load for it must match.
    fn adopt_session(&self, user: &SessionUser) -> u64 {
        let epoch = self.shared.identity_epoch();
        if let Identity::Session(active) = &self.shared.snapshot().identity {
            if active.id == user.id {
                return epoch;
            }
        }

        info!(user_id = %user.id, "Session identity adopted");
        self.shared.switch_identity(|snapshot| {
            snapshot.identity = Identity::Session(user.clone());
            snapshot.profile = None;
            snapshot.profile_missing = false;
            snapshot.loading = true;
        })
    }

    /// The store reported no session. A wallet-only identity is unaffected.
    fn end_session(&self) {
        let snapshot = self.shared.snapshot();
        if snapshot.identity.is_session() {
            info!("Session ended");
            self.shared.switch_identity(|snapshot| {
                snapshot.identity = Identity::Anonymous;
                snapshot.profile = None;
                snapshot.profile_missing = false;
                snapshot.loading = false;
            });
        } else {
            self.shared.update_if(|snapshot| std::mem::replace(&mut snapshot.loading, false));
        }
    }

    // =========================================================================
    // Profile loading
    // =========================================================================

    async fn load_profile(&self, user: &SessionUser, epoch: u64) {
        let load = self.fetch_or_create(user).await;

        let applied = self.shared.update_for_identity(epoch, |snapshot| {
            match load {
                ProfileLoad::Found(profile) => {
                    snapshot.profile = Some(profile);
                    snapshot.profile_missing = false;
                }
                ProfileLoad::CreateFailed => {
                    snapshot.profile = None;
                    snapshot.profile_missing = true;
                }
                ProfileLoad::Absent | ProfileLoad::Failed => snapshot.profile = None,
            }
            snapshot.loading = false;
        });

        if !applied {
            debug!(user_id = %user.id, "Discarding profile load for a superseded identity");
            return;
        }
        self.wallet.on_profile_loaded().await;
    }

    async fn fetch_or_create(&self, user: &SessionUser) -> ProfileLoad {
        match self.shared.profiles.fetch_profile(&user.id).await {
            Ok(Some(profile)) => return ProfileLoad::Found(profile),
            Ok(None) => {}
            Err(error) => {
                error!(user_id = %user.id, error = %error, "Failed to fetch profile");
                return ProfileLoad::Failed;
            }
        }

        let Some(email) = user.email.as_deref() else {
            warn!(user_id = %user.id, "No profile and no email to create one from");
            return ProfileLoad::Absent;
        };

        match self
            .shared
            .profiles
            .insert_profile(&NewProfile::from_email(&user.id, email))
            .await
        {
            Ok(_) => info!(user_id = %user.id, "Created profile"),
            // Created concurrently; read it back below.
            Err(RepositoryError::Conflict(_)) => {}
            Err(error) => {
                error!(user_id = %user.id, error = %error, "Failed to create profile");
                return ProfileLoad::CreateFailed;
            }
        }

        match self.shared.profiles.fetch_profile(&user.id).await {
            Ok(Some(profile)) => ProfileLoad::Found(profile),
            Ok(None) => {
                error!(user_id = %user.id, "Profile missing after create");
                ProfileLoad::CreateFailed
            }
            Err(error) => {
                error!(user_id = %user.id, error = %error, "Failed to re-fetch profile");
                ProfileLoad::CreateFailed
            }
        }
    }

    /// Re-read the active identity's profile row.
    pub async fn reload_profile(&self) -> Result<Option<Profile>, AuthError> {
        let epoch = self.shared.identity_epoch();
        let snapshot = self.shared.snapshot();
        let user_id = snapshot
            .identity
            .id()
            .ok_or(AuthError::NotAuthenticated)?
            .to_string();

        let profile = self.shared.profiles.fetch_profile(&user_id).await?;
        self.shared.update_for_identity(epoch, |snapshot| {
            snapshot.profile = profile.clone();
        });
        Ok(profile)
    }

    // =========================================================================
    // Wallet sync
    // =========================================================================

    /// Adopt an authenticated wallet user that has wallets, creating its
    /// profile on first sight.
    ///
    /// Skipped while a session identity is active; the wallet is then
    /// mirrored into the session's profile instead.
    pub(crate) async fn sync_wallet_user(&self, user: &WalletUser) {
        let epoch = self.shared.identity_epoch();
        let snapshot = self.shared.snapshot();
        match &snapshot.identity {
            Identity::Session(_) => {
                debug!(wallet_user = %user.id, "Session identity is primary; skipping wallet sync");
                return;
            }
            Identity::Wallet(active) if active.id == user.id && snapshot.profile.is_some() => {
                return;
            }
            _ => {}
        }

        match self.ensure_wallet_profile(user).await {
            Ok(profile) => {
                let adopted = self.shared.switch_identity_if(epoch, |snapshot| {
                    snapshot.identity = Identity::Wallet(user.clone());
                    snapshot.profile = Some(profile);
                    snapshot.profile_missing = false;
                    snapshot.loading = false;
                });
                if adopted {
                    info!(user_id = %user.id, "Wallet identity adopted");
                } else {
                    debug!(user_id = %user.id, "Identity changed during wallet sync");
                }
            }
            Err(error) => {
                error!(user_id = %user.id, error = %error, "Failed to sync wallet user profile");
                self.shared.update_for_identity(epoch, |snapshot| {
                    snapshot.profile_missing = true;
                    snapshot.loading = false;
                });
            }
        }
    }

    async fn ensure_wallet_profile(&self, user: &WalletUser) -> Result<Profile, RepositoryError> {
        if let Some(profile) = self.shared.profiles.fetch_profile(&user.id).await? {
            return Ok(profile);
        }

        let new_profile = wallet_profile(user);
        match self.shared.profiles.insert_profile(&new_profile).await {
            Ok(profile) => {
                info!(user_id = %user.id, username = %profile.username, "Created wallet profile");
                Ok(profile)
            }
            Err(RepositoryError::Conflict(_)) => self
                .shared
                .profiles
                .fetch_profile(&user.id)
                .await?
                .ok_or_else(|| RepositoryError::InvalidResponse("profile vanished".to_string())),
            Err(error) => Err(error),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Create a password account.
    ///
    /// When the store starts a session right away the identity is adopted
    /// immediately; the profile arrives with the session event. When email
    /// confirmation is pending nothing changes and
    /// [`AuthError::ConfirmationRequired`] is returned.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        full_name: &str,
    ) -> Result<(), AuthError> {
        debug!(username, full_name, "Sign-up requested");
        let outcome = self
            .shared
            .sessions
            .sign_up(email, password)
            .await
            .map_err(AuthError::from_provider)?;

        match outcome.session {
            Some(session) => {
                self.adopt_session(&session.user);
                Ok(())
            }
            None => {
                info!("Sign-up awaiting email confirmation");
                Err(AuthError::ConfirmationRequired)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let session = self
            .shared
            .sessions
            .sign_in_with_password(email, password)
            .await
            .map_err(AuthError::from_provider)?;
        self.adopt_session(&session.user);
        Ok(())
    }

    /// End every session.
    ///
    /// Local state is cleared first; the store and provider logouts are
    /// best-effort and only logged when they fail.
    pub async fn sign_out(&self) {
        let wallet_authenticated = self.shared.wallets.state().authenticated;
        self.shared.reset_all();
        info!("Signed out");

        if let Err(error) = self.shared.sessions.sign_out().await {
            warn!(error = %error, "Session store sign-out failed");
        }
        if wallet_authenticated {
            if let Err(error) = self.shared.wallets.logout().await {
                warn!(error = %error, "Wallet provider logout failed");
            }
        }
    }

    /// Write profile fields for the active identity and return the reloaded
    /// row.
    ///
    /// Older schemas may lack `website` and `x_url`; the write is retried
    /// once without them.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, AuthError> {
        let snapshot = self.shared.snapshot();
        let user_id = snapshot
            .identity
            .id()
            .ok_or(AuthError::NotAuthenticated)?
            .to_string();

        match self.shared.profiles.update_profile(&user_id, &update).await {
            Ok(()) => {}
            Err(RepositoryError::MissingColumn { column, .. })
                if OPTIONAL_PROFILE_COLUMNS.contains(&column.as_str()) =>
            {
                warn!(
                    column = %column,
                    hint = "ALTER TABLE profiles ADD COLUMN IF NOT EXISTS website text; \
                            ALTER TABLE profiles ADD COLUMN IF NOT EXISTS x_url text;",
                    "profiles table is missing an optional column; retrying without website and x_url"
                );
                let retry = update.without_optional_columns();
                if !retry.is_empty() {
                    self.shared.profiles.update_profile(&user_id, &retry).await?;
                }
            }
            Err(error) => return Err(error.into()),
        }

        debug!(user_id = %user_id, "Profile updated");
        self.reload_profile().await?.ok_or(AuthError::ProfileMissing)
    }

    pub fn dismiss_profile_missing(&self) {
        self.shared
            .update_if(|snapshot| std::mem::replace(&mut snapshot.profile_missing, false));
    }
}
