//! Chat synchronization.
//!
//! A [`SyncEngine`] turns a signed-in session into a running [`SyncHandle`]:
//! a fixed-window poll loop that replaces the [`ConversationView`] on every
//! successful fetch, local appends for sent messages, actor inference, and a
//! forced logout whenever the backend answers `401`.

mod engine;
mod view;

use chat_backend::{Author, Message};

pub use engine::{SendOutcome, SkipReason, SyncEngine, SyncError, SyncHandle, SyncSnapshot};
pub use view::{ConversationView, ReconcilePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// Waiting for the first successful fetch.
    Loading,
    Ready,
    /// A poll is in flight over an already-loaded view.
    Refreshing,
    /// The backend rejected the credential. Terminal.
    Unauthorized,
    /// Torn down by the owner. Terminal.
    Stopped,
}

impl SyncPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unauthorized | Self::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    PhaseChanged(SyncPhase),
    /// A poll replaced the view; `len` is the new message count.
    ViewReplaced { len: usize },
    MessageAppended(Message),
    ActorIdentified(Author),
    Unauthorized,
}
