use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_backend::{utf16_len, BackendError, Message, MESSAGE_TEXT_MAX_UNITS};
use session_store::SessionStore;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::navigation::Navigator;
use crate::sync::view::{Conversation, ConversationView, MergeOutcome};
use crate::sync::{SyncEvent, SyncPhase};

const EVENT_CAPACITY: usize = 64;
/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No token was held; a redirect to login has been queued.
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Why a send did not reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The text was empty after trimming.
    Empty,
    /// Another send was still outstanding.
    InFlight,
    /// The engine was torn down or the session was rejected.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Message),
    Skipped(SkipReason),
}

/// Point-in-time copy of the engine state for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub view: ConversationView,
    /// True until the first fetch attempt settles, whatever its outcome.
    pub is_loading: bool,
    pub sending: bool,
}

/// Builds sync sessions for one signed-in client.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    navigator: Arc<Navigator>,
    config: SyncConfig,
}

impl SyncEngine {
    #[must_use]
    pub fn new(navigator: Arc<Navigator>, config: SyncConfig) -> Self {
        Self { navigator, config }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Starts the poll loop on the current tokio runtime.
    ///
    /// Without a token the loop never starts: a redirect to login is queued and
    /// [`SyncError::NotAuthenticated`] is returned.
    pub fn activate(&self) -> Result<SyncHandle, SyncError> {
        let session = Arc::clone(self.navigator.session());
        if !session.is_authenticated() {
            info!("sync activation without a session; redirecting to login");
            self.navigator.force_logout();
            return Err(SyncError::NotAuthenticated);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            session,
            navigator: Arc::clone(&self.navigator),
            config: self.config.clone(),
            state: Mutex::new(EngineState {
                phase: SyncPhase::Idle,
                conversation: Conversation::new(self.config.reconcile),
                first_fetch_settled: false,
            }),
            events,
            cancel: CancellationToken::new(),
            sending: AtomicBool::new(false),
        });

        shared.set_phase(SyncPhase::Loading);
        let poll_task = tokio::spawn(run_poll_loop(Arc::clone(&shared)));
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            limit = self.config.page.limit,
            "sync activated"
        );

        Ok(SyncHandle {
            shared,
            poll_task: Some(poll_task),
        })
    }
}

/// Owner of one running sync session. Dropping it tears the session down.
#[derive(Debug)]
pub struct SyncHandle {
    shared: Arc<Shared>,
    poll_task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Sends `text` as typed; trimming only decides whether it is empty.
    ///
    /// At most one send is outstanding; overlapping calls return
    /// [`SendOutcome::Skipped`] without a request. A failed send appends
    /// nothing and returns the error so the caller can keep the text.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, BackendError> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::Empty));
        }
        if utf16_len(text) > MESSAGE_TEXT_MAX_UNITS {
            return Err(BackendError::validation(
                "text",
                format!("Ensure this field has no more than {MESSAGE_TEXT_MAX_UNITS} characters."),
            ));
        }
        if self.shared.cancel.is_cancelled() {
            return Ok(SendOutcome::Skipped(SkipReason::Inactive));
        }
        let Some(_guard) = SendGuard::acquire(&self.shared.sending) else {
            debug!("send skipped; another send is in flight");
            return Ok(SendOutcome::Skipped(SkipReason::InFlight));
        };

        let Some(token) = self.shared.session.token() else {
            self.shared.force_logout();
            return Err(BackendError::unauthorized("not authenticated"));
        };

        let result = self
            .shared
            .session
            .backend()
            .create_message(&token, text)
            .await;

        if self.shared.cancel.is_cancelled() {
            debug!("discarding send result after teardown");
            return result.map(SendOutcome::Sent);
        }

        match result {
            Ok(message) => {
                self.shared.apply_sent(message.clone());
                Ok(SendOutcome::Sent(message))
            }
            Err(error) if error.is_unauthorized() => {
                self.shared.force_logout();
                Err(error)
            }
            Err(error) => {
                warn!(%error, "send failed");
                Err(error)
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.shared.lock_state();
        SyncSnapshot {
            phase: state.phase,
            view: state.conversation.view().clone(),
            is_loading: !state.first_fetch_settled,
            sending: self.shared.sending.load(Ordering::Acquire),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.shared.lock_state().phase
    }

    #[must_use]
    pub fn view(&self) -> ConversationView {
        self.shared.lock_state().conversation.view().clone()
    }

    /// Events emitted after this call. Slow receivers lag; the engine never waits.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Whether the poll loop has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stops the poll loop. Requests already in flight finish, but their
    /// results are discarded. Idempotent.
    pub fn teardown(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();
        let mut state = self.shared.lock_state();
        if state.phase != SyncPhase::Unauthorized {
            self.shared.transition(&mut state, SyncPhase::Stopped);
        }
        drop(state);
        info!("sync torn down");
    }

    /// Waits for the poll loop to exit after [`SyncHandle::teardown`] or a forced logout.
    pub async fn join(mut self) {
        self.teardown();
        if let Some(task) = self.poll_task.take() {
            if let Err(error) = task.await {
                warn!(%error, "poll loop ended abnormally");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[derive(Debug)]
struct EngineState {
    phase: SyncPhase,
    conversation: Conversation,
    first_fetch_settled: bool,
}

#[derive(Debug)]
struct Shared {
    session: Arc<SessionStore>,
    navigator: Arc<Navigator>,
    config: SyncConfig,
    state: Mutex<EngineState>,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
    sending: AtomicBool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock_unpoisoned(&self.state)
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, state: &mut EngineState, phase: SyncPhase) {
        if state.phase == phase {
            return;
        }
        debug!(from = ?state.phase, to = ?phase, "sync phase");
        state.phase = phase;
        self.emit(SyncEvent::PhaseChanged(phase));
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut state = self.lock_state();
        self.transition(&mut state, phase);
    }

    fn begin_fetch(&self) {
        let mut state = self.lock_state();
        if state.phase == SyncPhase::Ready {
            self.transition(&mut state, SyncPhase::Refreshing);
        }
    }

    fn apply_page(&self, messages: Vec<Message>) {
        let infer_actor = self.session.is_authenticated();
        let mut state = self.lock_state();
        let outcome = state.conversation.replace(messages, infer_actor);
        state.first_fetch_settled = true;
        let len = state.conversation.view().len();
        self.transition(&mut state, SyncPhase::Ready);
        drop(state);

        self.emit(SyncEvent::ViewReplaced { len });
        self.announce(outcome);
    }

    /// A failed fetch leaves the phase where it was before the fetch began.
    fn settle_failed_fetch(&self) {
        let mut state = self.lock_state();
        state.first_fetch_settled = true;
        if state.phase == SyncPhase::Refreshing {
            self.transition(&mut state, SyncPhase::Ready);
        }
    }

    fn apply_sent(&self, message: Message) {
        let mut state = self.lock_state();
        let Some(outcome) = state.conversation.append_sent(message.clone()) else {
            debug!(id = message.id, "sent message already in view");
            return;
        };
        drop(state);

        self.emit(SyncEvent::MessageAppended(message));
        self.announce(outcome);
    }

    fn announce(&self, outcome: MergeOutcome) {
        if let Some(actor) = outcome.actor {
            debug!(actor_id = actor.id, "actor identified");
            self.emit(SyncEvent::ActorIdentified(actor));
        }
    }

    fn force_logout(&self) {
        self.cancel.cancel();
        let mut state = self.lock_state();
        state.first_fetch_settled = true;
        if state.phase == SyncPhase::Unauthorized {
            return;
        }
        self.transition(&mut state, SyncPhase::Unauthorized);
        drop(state);

        self.navigator.force_logout();
        self.emit(SyncEvent::Unauthorized);
    }
}

async fn run_poll_loop(shared: Arc<Shared>) {
    let mut ticker = interval(shared.config.poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !poll_once(&shared).await {
            break;
        }
    }
    debug!("poll loop exited");
}

/// One fetch-merge cycle. Returns whether the loop should keep going.
async fn poll_once(shared: &Shared) -> bool {
    let Some(token) = shared.session.token() else {
        shared.force_logout();
        return false;
    };

    shared.begin_fetch();
    let result = shared
        .session
        .backend()
        .list_messages(&token, shared.config.page)
        .await;

    if shared.cancel.is_cancelled() {
        debug!("discarding poll result after teardown");
        return false;
    }

    match result {
        Ok(page) => {
            shared.apply_page(page.results);
            true
        }
        Err(error) if error.is_unauthorized() => {
            shared.force_logout();
            false
        }
        Err(error) => {
            warn!(%error, "poll failed; retrying on next tick");
            shared.settle_failed_fetch();
            true
        }
    }
}

/// Holds the single in-flight send slot until dropped.
struct SendGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SendGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
