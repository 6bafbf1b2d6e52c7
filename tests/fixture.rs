#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chat_backend_mock::MockBackend;
use chat_sync::{Navigator, SyncConfig, SyncEngine};
use session_store::SessionStore;

pub const POLL: Duration = Duration::from_millis(3000);
pub const ANN: &str = "ann";
pub const ANN_PASSWORD: &str = "secret1";

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub session: Arc<SessionStore>,
    pub navigator: Arc<Navigator>,
}

impl Harness {
    /// Backend with `ann` as its only account; nobody signed in.
    pub fn signed_out() -> Self {
        let backend = Arc::new(MockBackend::new());
        backend.add_account(ANN, "ann@example.com", ANN_PASSWORD);
        Self::with_backend(backend)
    }

    pub fn with_backend(backend: Arc<MockBackend>) -> Self {
        let session = Arc::new(SessionStore::in_memory(backend.clone()));
        let navigator = Arc::new(Navigator::new(Arc::clone(&session)));
        Self {
            backend,
            session,
            navigator,
        }
    }

    pub async fn signed_in() -> Self {
        let harness = Self::signed_out();
        harness.login().await;
        harness
    }

    pub async fn login(&self) {
        self.session
            .login(ANN, ANN_PASSWORD)
            .await
            .expect("ann should be able to log in");
    }

    pub fn engine(&self) -> SyncEngine {
        self.engine_with(SyncConfig::default())
    }

    pub fn engine_with(&self, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(Arc::clone(&self.navigator), config)
    }
}

/// Lets spawned tasks run to their next timer without reaching the next poll.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advances the paused clock past `polls` further poll ticks.
pub async fn advance_polls(polls: u32) {
    tokio::time::sleep(POLL * polls).await;
}

pub fn ids(messages: &[chat_backend::Message]) -> Vec<u64> {
    messages.iter().map(|message| message.id).collect()
}
