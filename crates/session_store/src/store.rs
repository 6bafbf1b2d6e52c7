use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chat_backend::{
    Account, AuthResponse, AuthToken, BackendError, ChatBackend, LoginRequest, RegisterRequest,
};
use tracing::{debug, info, warn};

use crate::error::SessionStoreError;
use crate::storage::{MemoryTokenStorage, TokenStorage};

/// An authenticated session as returned by register/login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: AuthToken,
    /// Account fields echoed by the backend, when it sent them.
    pub account: Option<Account>,
}

/// Outcome of [`SessionStore::logout`]. Logout never fails to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The backend invalidated the token and the local copy was cleared.
    LoggedOut,
    /// Only the local copy was cleared; the remote call failed or was skipped.
    LoggedOutLocally,
}

/// Owner of the authentication token.
///
/// The token is either held in full or absent. Every mutation goes through
/// this type, and the persisted slot is kept in step with memory on a
/// best-effort basis: storage failures are logged, never surfaced as auth
/// failures.
pub struct SessionStore {
    backend: Arc<dyn ChatBackend>,
    storage: Arc<dyn TokenStorage>,
    token: RwLock<Option<AuthToken>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Opens the store, restoring any token already in `storage`.
    pub fn open(
        backend: Arc<dyn ChatBackend>,
        storage: Arc<dyn TokenStorage>,
    ) -> Result<Self, SessionStoreError> {
        let token = storage.load()?;
        debug!(restored = token.is_some(), "session store opened");
        Ok(Self {
            backend,
            storage,
            token: RwLock::new(token),
        })
    }

    /// A store with a fresh in-memory slot.
    #[must_use]
    pub fn in_memory(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            storage: Arc::new(MemoryTokenStorage::new()),
            token: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .backend
            .register(&RegisterRequest::new(username, email, password))
            .await?;
        let session = self.adopt(response)?;
        info!(username, "registered");
        Ok(session)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .backend
            .login(&LoginRequest::new(username, password))
            .await?;
        let session = self.adopt(response)?;
        info!(username, "logged in");
        Ok(session)
    }

    /// Best-effort remote invalidation, then the local token is cleared.
    pub async fn logout(&self) -> Ack {
        let Some(token) = self.token() else {
            self.clear_storage();
            return Ack::LoggedOutLocally;
        };

        let ack = match self.backend.logout(&token).await {
            Ok(()) => Ack::LoggedOut,
            Err(error) => {
                warn!(%error, "remote logout failed; clearing local session only");
                Ack::LoggedOutLocally
            }
        };
        self.clear();
        info!(?ack, "logged out");
        ack
    }

    /// Whether a token is held. No I/O.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        read_unpoisoned(&self.token).is_some()
    }

    #[must_use]
    pub fn token(&self) -> Option<AuthToken> {
        read_unpoisoned(&self.token).clone()
    }

    /// Drops the session after the backend rejected the credential.
    ///
    /// Returns whether a token was held.
    pub fn invalidate(&self) -> bool {
        let held = self.clear();
        if held {
            warn!("session invalidated after credential rejection");
        }
        held
    }

    fn adopt(&self, response: AuthResponse) -> Result<Session, BackendError> {
        let token = response
            .auth_token()
            .ok_or_else(|| BackendError::network("authentication response carried no token"))?;
        *write_unpoisoned(&self.token) = Some(token.clone());
        if let Err(error) = self.storage.save(&token) {
            warn!(%error, "failed to persist authentication token");
        }
        Ok(Session {
            token,
            account: response.account(),
        })
    }

    fn clear(&self) -> bool {
        let held = write_unpoisoned(&self.token).take().is_some();
        self.clear_storage();
        held
    }

    fn clear_storage(&self) {
        if let Err(error) = self.storage.clear() {
            warn!(%error, "failed to clear persisted authentication token");
        }
    }
}

fn read_unpoisoned<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_unpoisoned<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
