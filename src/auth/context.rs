// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Context
//!
//! [`AuthContext`] is what the rest of the application holds. It owns the
//! snapshot, the reconciler and the wallet manager, and runs one background
//! task that applies session events and wallet provider updates in the order
//! they arrive.
//!
//! ## Lifecycle
//!
//! ```rust,ignore
//! let auth = AuthContext::new(sessions, wallets, profiles);
//! auth.init().await;          // restores any session, starts the event loop
//! let snapshot = auth.settled().await;
//! // ...
//! auth.dispose();             // stops the event loop
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{broadcast, broadcast::error::RecvError, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    error::AuthError,
    identity::Identity,
    reconciler::IdentityReconciler,
    state::{AuthSnapshot, Shared, WalletConnectionState},
    wallet::WalletConnectionManager,
};
use crate::models::{Profile, ProfileUpdate, WalletType};
use crate::providers::{
    ProfileRepository, SessionEvent, SessionStore, WalletProvider, WalletProviderState,
};

/// Shared handle to the auth core. Cheap to clone.
#[derive(Clone)]
pub struct AuthContext {
    shared: Arc<Shared>,
    reconciler: IdentityReconciler,
    wallet: WalletConnectionManager,
    shutdown: CancellationToken,
    started: Arc<AtomicBool>,
}

impl AuthContext {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        wallets: Arc<dyn WalletProvider>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let shared = Arc::new(Shared::new(sessions, wallets, profiles));
        let wallet = WalletConnectionManager::new(shared.clone());
        let reconciler = IdentityReconciler::new(shared.clone(), wallet.clone());
        Self {
            shared,
            reconciler,
            wallet,
            shutdown: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restore the current session, apply the wallet provider's current
    /// state and start the event loop.
    ///
    /// Subscriptions are taken before the session check so no event is
    /// missed. Calling this more than once is a no-op.
    pub async fn init(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Auth context already initialized");
            return;
        }

        let session_events = self.shared.sessions.subscribe();
        let mut wallet_states = self.shared.wallets.subscribe();

        self.reconciler.restore().await;
        let initial = wallet_states.borrow_and_update().clone();
        self.apply_wallet_state(initial).await;

        tokio::spawn(self.clone().run(session_events, wallet_states));
        info!("Auth context initialized");
    }

    /// Stop the event loop. State stays readable.
    pub fn dispose(&self) {
        self.shutdown.cancel();
    }

    /// The event loop was started and has not been disposed.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    async fn run(
        self,
        mut session_events: broadcast::Receiver<SessionEvent>,
        mut wallet_states: watch::Receiver<WalletProviderState>,
    ) {
        info!("Auth event loop starting");
        let mut sessions_open = true;
        let mut wallets_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = session_events.recv(), if sessions_open => match event {
                    Ok(event) => self.reconciler.handle_session_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session events lagged; re-reading current session");
                        self.reconciler.restore().await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session event stream closed");
                        sessions_open = false;
                    }
                },
                changed = wallet_states.changed(), if wallets_open => match changed {
                    Ok(()) => {
                        let state = wallet_states.borrow_and_update().clone();
                        self.apply_wallet_state(state).await;
                    }
                    Err(_) => {
                        debug!("Wallet provider stream closed");
                        wallets_open = false;
                    }
                },
            }
        }

        info!("Auth event loop shutting down");
    }

    async fn apply_wallet_state(&self, state: WalletProviderState) {
        let epoch = self.shared.wallet_epoch();
        if let Some(user) = state.syncable_user() {
            self.reconciler.sync_wallet_user(user).await;
        }
        self.wallet.on_provider_state(epoch, &state).await;
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.snapshot()
    }

    /// Receiver that observes every snapshot change. Dropping it
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.subscribe()
    }

    /// Wait until no load is in flight and return that snapshot.
    pub async fn settled(&self) -> AuthSnapshot {
        let mut receiver = self.shared.subscribe();
        let settled = match receiver.wait_for(|snapshot| !snapshot.loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.shared.snapshot(),
        };
        settled
    }

    pub fn identity(&self) -> Identity {
        self.shared.snapshot().identity
    }

    pub fn profile(&self) -> Option<Profile> {
        self.shared.snapshot().profile
    }

    pub fn connected_wallet(&self) -> Option<WalletType> {
        self.shared.snapshot().connected_wallet()
    }

    pub fn wallet_address(&self) -> Option<String> {
        self.shared.snapshot().wallet_address().map(str::to_string)
    }

    pub fn wallet_state(&self) -> WalletConnectionState {
        self.wallet.state()
    }

    /// Repository the context reads profiles from.
    pub fn profiles(&self) -> Arc<dyn ProfileRepository> {
        self.shared.profiles.clone()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        full_name: &str,
    ) -> Result<(), AuthError> {
        self.reconciler
            .sign_up(email, password, username, full_name)
            .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.reconciler.sign_in(email, password).await
    }

    pub async fn sign_out(&self) {
        self.reconciler.sign_out().await
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, AuthError> {
        self.reconciler.update_profile(update).await
    }

    pub async fn reload_profile(&self) -> Result<Option<Profile>, AuthError> {
        self.reconciler.reload_profile().await
    }

    pub fn dismiss_profile_missing(&self) {
        self.reconciler.dismiss_profile_missing()
    }

    pub async fn connect_wallet(&self, wallet_type: WalletType) -> Result<(), AuthError> {
        self.wallet.connect_wallet(wallet_type).await
    }

    pub async fn disconnect_wallet(&self) {
        self.wallet.disconnect_wallet().await
    }

    pub fn dismiss_wallet_notice(&self) {
        self.wallet.dismiss_notice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::{Notify, Semaphore};

    use crate::auth::WalletNotice;
    use crate::models::{NewProfile, NewTransaction, Transaction};
    use crate::providers::{
        ConnectedWallet, InMemoryProfileRepository, InMemorySessionStore, ProviderError,
        RepositoryError, WalletBridge, WalletLoginError, WalletUser,
    };

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        ctx: AuthContext,
        sessions: Arc<InMemorySessionStore>,
        bridge: WalletBridge,
        profiles: Arc<InMemoryProfileRepository>,
    }

    async fn start(sessions: InMemorySessionStore, profiles: InMemoryProfileRepository) -> Harness {
        let sessions = Arc::new(sessions);
        let profiles = Arc::new(profiles);
        let bridge = WalletBridge::new();
        let ctx = AuthContext::new(sessions.clone(), Arc::new(bridge.clone()), profiles.clone());
        ctx.init().await;
        Harness {
            ctx,
            sessions,
            bridge,
            profiles,
        }
    }

    async fn wait_for(
        ctx: &AuthContext,
        predicate: impl FnMut(&AuthSnapshot) -> bool,
    ) -> AuthSnapshot {
        let mut receiver = ctx.subscribe();
        let snapshot = tokio::time::timeout(WAIT, receiver.wait_for(predicate))
            .await
            .expect("timed out waiting for auth state")
            .expect("auth state channel closed")
            .clone();
        snapshot
    }

    async fn stored_profile(
        profiles: &InMemoryProfileRepository,
        id: &str,
        predicate: impl Fn(&Profile) -> bool,
    ) -> Profile {
        for _ in 0..200 {
            if let Some(profile) = profiles.profile(id).await {
                if predicate(&profile) {
                    return profile;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("profile {id} never reached the expected state");
    }

    fn wallet_state(user: Option<WalletUser>, wallets: Vec<ConnectedWallet>) -> WalletProviderState {
        WalletProviderState {
            ready: true,
            authenticated: user.is_some(),
            user,
            wallets_ready: true,
            wallets,
            login_requested: false,
            login_error: None,
        }
    }

    fn wallet_user() -> WalletUser {
        WalletUser {
            id: "did:privy:cm3xyz123".into(),
            email: None,
            linked_accounts: Vec::new(),
        }
    }

    fn solana_wallet() -> ConnectedWallet {
        ConnectedWallet {
            address: "So1anaAddr111".into(),
            chain_id: Some("solana:mainnet".into()),
        }
    }

    /// Store holding an account for `email` whose session is still active.
    async fn store_with_session(email: &str) -> (InMemorySessionStore, String) {
        let store = InMemorySessionStore::new();
        let outcome = store.sign_up(email, "secret1").await.unwrap();
        let user_id = outcome.user.unwrap().id;
        (store, user_id)
    }

    fn profile_with_wallet(id: &str, email: &str, wallet_type: WalletType, address: &str) -> Profile {
        let mut profile = NewProfile::from_email(id, email).into_profile(Utc::now());
        ProfileUpdate::wallet(wallet_type, address).apply_to(&mut profile);
        profile
    }

    // =========================================================================
    // Identity
    // =========================================================================

    #[tokio::test]
    async fn init_without_session_settles_anonymous() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;

        let snapshot = h.ctx.settled().await;
        assert_eq!(snapshot.identity, Identity::Anonymous);
        assert!(snapshot.profile.is_none());
        assert_eq!(snapshot.wallet, WalletConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn sign_up_creates_profile_named_after_email() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;

        h.ctx.sign_up("a@b.com", "secret1", "alice", "Alice").await.unwrap();
        assert_eq!(h.ctx.identity().email(), Some("a@b.com"));

        let snapshot = wait_for(&h.ctx, |s| s.profile.is_some()).await;
        let profile = snapshot.profile.unwrap();
        assert_eq!(profile.username, "a");
        assert_eq!(profile.full_name, "a");
        assert_eq!(profile.mail_address.as_deref(), Some("a@b.com"));
        assert!(!snapshot.loading);
        assert!(h.profiles.profile(&profile.id).await.is_some());
    }

    #[tokio::test]
    async fn sign_up_awaiting_confirmation_sets_no_identity() {
        let h = start(
            InMemorySessionStore::with_email_confirmation(),
            InMemoryProfileRepository::new(),
        )
        .await;

        let err = h.ctx.sign_up("c@d.com", "secret1", "", "").await.unwrap_err();
        assert_eq!(err, AuthError::ConfirmationRequired);
        assert_eq!(h.ctx.identity(), Identity::Anonymous);
        assert!(h.ctx.profile().is_none());
    }

    #[tokio::test]
    async fn sign_in_with_bad_credentials_fails() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;

        let err = h.ctx.sign_in("nobody@x.io", "wrongpass").await.unwrap_err();
        assert_eq!(err, AuthError::Auth("Invalid login credentials".into()));
        assert_eq!(h.ctx.identity(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn sign_in_loads_existing_profile() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.sign_up("e@f.io", "secret1", "", "").await.unwrap();
        wait_for(&h.ctx, |s| s.profile.is_some()).await;
        h.ctx.sign_out().await;

        h.ctx.sign_in("E@F.io", "secret1").await.unwrap();
        assert!(h.ctx.identity().is_session());

        let snapshot = wait_for(&h.ctx, |s| s.profile.is_some()).await;
        assert_eq!(snapshot.profile.unwrap().username, "e");
    }

    #[tokio::test]
    async fn restored_session_loads_profile_during_init() {
        let (store, user_id) = store_with_session("r@s.io").await;
        let h = start(store, InMemoryProfileRepository::new()).await;

        let snapshot = h.ctx.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.identity.id(), Some(user_id.as_str()));
        assert_eq!(snapshot.profile.unwrap().username, "r");
    }

    #[tokio::test]
    async fn profile_create_failure_flags_profile_missing() {
        let profiles = InMemoryProfileRepository::new();
        profiles.set_reject_profile_inserts(true);
        let h = start(InMemorySessionStore::new(), profiles).await;

        h.ctx.sign_up("m@n.io", "secret1", "", "").await.unwrap();
        let snapshot = wait_for(&h.ctx, |s| s.profile_missing).await;
        assert!(snapshot.profile.is_none());
        assert!(!snapshot.loading);
        assert!(snapshot.identity.is_session());

        h.ctx.dismiss_profile_missing();
        assert!(!h.ctx.snapshot().profile_missing);
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.sign_up("a@b.com", "secret1", "", "").await.unwrap();
        wait_for(&h.ctx, |s| s.profile.is_some()).await;
        h.bridge
            .publish(wallet_state(Some(wallet_user()), vec![solana_wallet()]));
        wait_for(&h.ctx, |s| s.wallet_address().is_some()).await;

        h.ctx.sign_out().await;

        let snapshot = h.ctx.snapshot();
        assert_eq!(snapshot.identity, Identity::Anonymous);
        assert!(snapshot.profile.is_none());
        assert_eq!(snapshot.connected_wallet(), None);
        assert_eq!(snapshot.wallet_address(), None);
        assert!(!snapshot.loading);
        assert!(h.sessions.current_session().await.unwrap().is_none());
        assert!(!h.bridge.state().authenticated);

        // Late provider and store events must not resurrect anything.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = h.ctx.snapshot();
        assert_eq!(snapshot.identity, Identity::Anonymous);
        assert_eq!(snapshot.wallet, WalletConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn sign_out_without_any_session_is_safe() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.sign_out().await;
        h.ctx.sign_out().await;
        assert_eq!(h.ctx.snapshot(), AuthSnapshot::signed_out());
    }

    // =========================================================================
    // Profile updates
    // =========================================================================

    #[tokio::test]
    async fn update_profile_requires_identity() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        let err = h
            .ctx
            .update_profile(ProfileUpdate {
                bio: Some("hello".into()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NotAuthenticated);
    }

    #[tokio::test]
    async fn update_profile_retries_without_missing_website_column() {
        let h = start(
            InMemorySessionStore::new(),
            InMemoryProfileRepository::with_missing_columns(&["website"]),
        )
        .await;
        h.ctx.sign_up("w@x.io", "secret1", "", "").await.unwrap();
        wait_for(&h.ctx, |s| s.profile.is_some()).await;

        let profile = h
            .ctx
            .update_profile(ProfileUpdate {
                website: Some("https://carelevel.io".into()),
                bio: Some("hello".into()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(profile.bio.as_deref(), Some("hello"));
        assert_eq!(profile.website, None);
        assert_eq!(h.ctx.profile().unwrap().bio.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn update_profile_propagates_other_failures() {
        let profiles = InMemoryProfileRepository::new();
        let h = start(InMemorySessionStore::new(), profiles).await;
        h.ctx.sign_up("u@v.io", "secret1", "", "").await.unwrap();
        wait_for(&h.ctx, |s| s.profile.is_some()).await;
        h.profiles.set_reject_updates(true);

        let err = h
            .ctx
            .update_profile(ProfileUpdate {
                bio: Some("x".into()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Repository(_)));
    }

    // =========================================================================
    // Wallet
    // =========================================================================

    #[tokio::test]
    async fn persisted_wallet_shown_until_provider_reports_none() {
        let (store, user_id) = store_with_session("p@q.io").await;
        let profiles = InMemoryProfileRepository::new();
        profiles
            .seed_profile(profile_with_wallet(&user_id, "p@q.io", WalletType::Ethereum, "0xabc"))
            .await;
        let h = start(store, profiles).await;

        // Provider not ready: fallback read from the profile row.
        let snapshot = h.ctx.snapshot();
        assert_eq!(snapshot.connected_wallet(), Some(WalletType::Ethereum));
        assert_eq!(snapshot.wallet_address(), Some("0xabc"));

        // Provider ready with no wallets: connection and row are cleared.
        h.bridge.publish(wallet_state(None, Vec::new()));
        let snapshot = wait_for(&h.ctx, |s| s.wallet == WalletConnectionState::Disconnected).await;
        assert_eq!(snapshot.profile.unwrap().persisted_wallet(), None);
        stored_profile(&h.profiles, &user_id, |p| p.persisted_wallet().is_none()).await;
    }

    #[tokio::test]
    async fn disconnect_clears_profile_row() {
        let (store, user_id) = store_with_session("d@e.io").await;
        let profiles = InMemoryProfileRepository::new();
        profiles
            .seed_profile(profile_with_wallet(&user_id, "d@e.io", WalletType::Bitcoin, "bc1q"))
            .await;
        let h = start(store, profiles).await;
        assert_eq!(h.ctx.connected_wallet(), Some(WalletType::Bitcoin));

        h.ctx.disconnect_wallet().await;

        assert_eq!(h.ctx.wallet_state(), WalletConnectionState::Disconnected);
        let stored = h.profiles.profile(&user_id).await.unwrap();
        assert_eq!(stored.persisted_wallet(), None);
    }

    #[tokio::test]
    async fn connect_then_provider_confirms_wallet() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.sign_up("k@l.io", "secret1", "", "").await.unwrap();
        let user_id = wait_for(&h.ctx, |s| s.profile.is_some())
            .await
            .profile
            .unwrap()
            .id;
        h.bridge.publish(WalletProviderState {
            ready: true,
            ..WalletProviderState::default()
        });

        h.ctx.connect_wallet(WalletType::Solana).await.unwrap();
        assert!(h.ctx.wallet_state().is_pending());
        assert!(h.bridge.state().login_requested);

        h.bridge.publish(wallet_state(None, vec![solana_wallet()]));
        let snapshot = wait_for(&h.ctx, |s| s.wallet_address().is_some()).await;
        assert_eq!(snapshot.connected_wallet(), Some(WalletType::Solana));

        let stored = stored_profile(&h.profiles, &user_id, |p| p.persisted_wallet().is_some()).await;
        assert_eq!(
            stored.persisted_wallet(),
            Some((WalletType::Solana, "So1anaAddr111"))
        );
    }

    #[tokio::test]
    async fn wallet_only_user_gets_fallback_username() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;

        h.bridge
            .publish(wallet_state(Some(wallet_user()), vec![solana_wallet()]));
        let snapshot = wait_for(&h.ctx, |s| {
            matches!(s.identity, Identity::Wallet(_)) && s.wallet_address().is_some()
        })
        .await;

        assert_eq!(snapshot.connected_wallet(), Some(WalletType::Solana));
        let profile = snapshot.profile.unwrap();
        assert_eq!(profile.id, "did:privy:cm3xyz123");
        assert_eq!(profile.username, "user_did:priv");
        assert_eq!(profile.full_name, "user_did:priv");

        stored_profile(&h.profiles, "did:privy:cm3xyz123", |p| {
            p.persisted_wallet() == Some((WalletType::Solana, "So1anaAddr111"))
        })
        .await;
    }

    #[tokio::test]
    async fn session_identity_stays_primary_over_wallet_user() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.sign_up("a@b.com", "secret1", "", "").await.unwrap();
        let session_id = wait_for(&h.ctx, |s| s.profile.is_some())
            .await
            .profile
            .unwrap()
            .id;

        h.bridge
            .publish(wallet_state(Some(wallet_user()), vec![solana_wallet()]));
        let snapshot = wait_for(&h.ctx, |s| s.wallet_address().is_some()).await;

        assert_eq!(snapshot.identity.id(), Some(session_id.as_str()));
        stored_profile(&h.profiles, &session_id, |p| p.persisted_wallet().is_some()).await;
        assert!(h.profiles.profile("did:privy:cm3xyz123").await.is_none());
    }

    #[tokio::test]
    async fn connect_failure_rolls_back_with_notice() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;

        let err = h.ctx.connect_wallet(WalletType::Ethereum).await.unwrap_err();
        assert!(err.is_transient());

        let snapshot = h.ctx.snapshot();
        assert_eq!(snapshot.wallet, WalletConnectionState::Disconnected);
        assert!(snapshot.wallet_notice.is_some());

        h.ctx.dismiss_wallet_notice();
        assert!(h.ctx.snapshot().wallet_notice.is_none());
    }

    #[tokio::test]
    async fn browser_reported_cancel_clears_pending_connect() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.bridge.publish(WalletProviderState {
            ready: true,
            wallets_ready: true,
            ..WalletProviderState::default()
        });

        h.ctx.connect_wallet(WalletType::Solana).await.unwrap();
        assert_eq!(h.ctx.connected_wallet(), Some(WalletType::Solana));

        // The modal was closed without picking a wallet.
        h.bridge.publish(WalletProviderState {
            ready: true,
            wallets_ready: true,
            login_error: Some(WalletLoginError::Cancelled),
            ..WalletProviderState::default()
        });
        let snapshot = wait_for(&h.ctx, |s| s.wallet_notice.is_some()).await;

        assert_eq!(snapshot.wallet, WalletConnectionState::Disconnected);
        assert_eq!(snapshot.connected_wallet(), None);
        assert_eq!(
            snapshot.wallet_notice,
            Some(WalletNotice::Cancelled {
                wallet_type: WalletType::Solana
            })
        );
    }

    /// Wallet provider whose login blocks until released, then is rejected.
    struct GatedWallet {
        bridge: WalletBridge,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl WalletProvider for GatedWallet {
        fn state(&self) -> WalletProviderState {
            self.bridge.state()
        }

        fn subscribe(&self) -> watch::Receiver<WalletProviderState> {
            self.bridge.subscribe()
        }

        async fn login(&self) -> Result<(), ProviderError> {
            self.release.notified().await;
            Err(ProviderError::UserRejected)
        }

        async fn logout(&self) -> Result<(), ProviderError> {
            self.bridge.logout().await
        }
    }

    #[tokio::test]
    async fn disconnect_wins_over_inflight_connect() {
        let release = Arc::new(Notify::new());
        let ctx = AuthContext::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(GatedWallet {
                bridge: WalletBridge::new(),
                release: release.clone(),
            }),
            Arc::new(InMemoryProfileRepository::new()),
        );
        ctx.init().await;

        let connecting = ctx.clone();
        let attempt =
            tokio::spawn(async move { connecting.connect_wallet(WalletType::Solana).await });
        wait_for(&ctx, |s| s.wallet.is_pending()).await;

        ctx.disconnect_wallet().await;
        release.notify_one();

        let result = attempt.await.unwrap();
        assert!(result.is_err());
        assert_eq!(ctx.wallet_state(), WalletConnectionState::Disconnected);
        assert_eq!(ctx.connected_wallet(), None);
    }

    /// Repository whose profile fetches wait for permits.
    struct GatedProfiles {
        inner: InMemoryProfileRepository,
        permits: Arc<Semaphore>,
    }

    #[async_trait]
    impl ProfileRepository for GatedProfiles {
        async fn fetch_profile(&self, id: &str) -> Result<Option<Profile>, RepositoryError> {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| RepositoryError::Request(e.to_string()))?;
            self.inner.fetch_profile(id).await
        }

        async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, RepositoryError> {
            self.inner.insert_profile(profile).await
        }

        async fn update_profile(
            &self,
            id: &str,
            update: &ProfileUpdate,
        ) -> Result<(), RepositoryError> {
            self.inner.update_profile(id, update).await
        }

        async fn top_profiles(&self, limit: usize) -> Result<Vec<Profile>, RepositoryError> {
            self.inner.top_profiles(limit).await
        }

        async fn list_transactions(
            &self,
            user_id: &str,
            limit: usize,
        ) -> Result<Vec<Transaction>, RepositoryError> {
            self.inner.list_transactions(user_id, limit).await
        }

        async fn insert_transaction(
            &self,
            transaction: &NewTransaction,
        ) -> Result<Transaction, RepositoryError> {
            self.inner.insert_transaction(transaction).await
        }
    }

    #[tokio::test]
    async fn profile_load_for_superseded_identity_is_discarded() {
        let (store, user_id) = store_with_session("slow@x.io").await;
        store.sign_out().await.unwrap();
        let store = Arc::new(store);

        let inner = InMemoryProfileRepository::new();
        inner
            .seed_profile(NewProfile::from_email(&user_id, "slow@x.io").into_profile(Utc::now()))
            .await;
        let permits = Arc::new(Semaphore::new(0));
        let ctx = AuthContext::new(
            store.clone(),
            Arc::new(WalletBridge::new()),
            Arc::new(GatedProfiles {
                inner,
                permits: permits.clone(),
            }),
        );
        ctx.init().await;

        store.sign_in_with_password("slow@x.io", "secret1").await.unwrap();
        wait_for(&ctx, |s| s.identity.is_session() && s.loading).await;

        ctx.sign_out().await;
        permits.add_permits(8);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.identity, Identity::Anonymous);
        assert!(snapshot.profile.is_none());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn init_twice_is_a_noop_and_dispose_stops_the_loop() {
        let h = start(InMemorySessionStore::new(), InMemoryProfileRepository::new()).await;
        h.ctx.init().await;
        assert!(h.ctx.is_running());
        h.ctx.dispose();
        assert!(!h.ctx.is_running());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Events after dispose are no longer applied.
        h.sessions.sign_up("late@x.io", "secret1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.ctx.identity(), Identity::Anonymous);
    }
}
