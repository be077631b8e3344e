//! Session/Identity provider
//!
//! Tracks the authenticated identity and gates the transport lifecycle:
//! the connection manager may only be active while an identity is
//! published. Each authentication transition bumps a session epoch;
//! late-arriving network results are applied only if their epoch still
//! matches (see [`SessionProvider::epoch`]).

pub mod token_store;

pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::types::{Identity, LoginCredentials, RegisterCredentials, Result, SyncError};

/// Owns the authenticated identity and its persisted token
pub struct SessionProvider {
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    identity_tx: watch::Sender<Option<Identity>>,
    /// Bumped on every login/logout/forced sign-out. Stale async results
    /// carry the epoch they started under and are discarded on mismatch.
    epoch: AtomicU64,
}

impl SessionProvider {
    pub fn new(api: ApiClient, tokens: Arc<dyn TokenStore>) -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            api,
            tokens,
            identity_tx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Current session epoch
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Snapshot of the current identity, if authenticated
    pub fn identity(&self) -> Option<Identity> {
        self.identity_tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity_tx.borrow().is_some()
    }

    /// Watch identity transitions (authenticated <-> unauthenticated)
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    /// Log in with email/password. Persists the returned token and
    /// publishes the identity in a single step: token-without-identity is
    /// never observable through this provider.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<Identity> {
        let payload = self.api.login(&credentials).await?;
        self.install(payload.token, payload.user)
    }

    /// Register a new account; same exchange shape as login
    pub async fn register(&self, credentials: RegisterCredentials) -> Result<Identity> {
        let payload = self.api.register(&credentials).await?;
        self.install(payload.token, payload.user)
    }

    pub(crate) fn install(&self, token: String, user: crate::types::User) -> Result<Identity> {
        if let Err(e) = self.tokens.save(&token) {
            // Persistence is best-effort; the in-memory session still works.
            warn!("Failed to persist auth token: {}", e);
        }
        let identity = Identity { user, token };
        self.bump_epoch();
        self.identity_tx.send_replace(Some(identity.clone()));
        info!(
            user = %identity.user.id,
            role = ?identity.user.role,
            "Session established"
        );
        Ok(identity)
    }

    /// Restore a session from a persisted token, if one exists.
    ///
    /// On an invalid or expired token the persisted token is cleared and
    /// the provider stays unauthenticated; no error reaches the caller
    /// beyond the `None` return.
    pub async fn restore(&self) -> Option<Identity> {
        if self.is_authenticated() {
            return self.identity();
        }

        let token = self.tokens.load()?;

        match self.api.me(&token).await {
            Ok(user) => {
                let identity = Identity { user, token };
                self.bump_epoch();
                self.identity_tx.send_replace(Some(identity.clone()));
                info!(user = %identity.user.id, "Session restored from persisted token");
                Some(identity)
            }
            Err(e) => {
                debug!("Persisted token rejected, clearing: {}", e);
                self.tokens.clear();
                None
            }
        }
    }

    /// Log out. The identity is cleared (triggering transport teardown via
    /// the watch channel) before the best-effort remote logout call, so
    /// teardown is requested by the time this returns.
    pub async fn logout(&self) {
        let token = self.identity().map(|id| id.token);

        self.bump_epoch();
        self.identity_tx.send_replace(None);
        self.tokens.clear();
        info!("Session cleared");

        if let Some(token) = token {
            if let Err(e) = self.api.logout(&token).await {
                debug!("Remote logout failed (ignored): {}", e);
            }
        }
    }

    /// Global forced sign-out, used when any operation hits HTTP 401
    pub fn force_sign_out(&self) {
        if self.identity_tx.borrow().is_none() {
            return;
        }
        self.bump_epoch();
        self.identity_tx.send_replace(None);
        self.tokens.clear();
        warn!("Forced sign-out: credentials rejected by server");
    }

    /// Route an operation error through the forced sign-out path when it is
    /// an authorization failure, then hand it back.
    pub fn classify(&self, err: SyncError) -> SyncError {
        if err.is_unauthorized() {
            self.force_sign_out();
        }
        err
    }
}
