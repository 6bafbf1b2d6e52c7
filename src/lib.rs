//! Session and conversation synchronization for a polling chat client.
//!
//! The pieces, leaves first:
//! - [`session_store::SessionStore`] owns the authentication token.
//! - [`navigation`] decides where a navigation attempt may land.
//! - [`sync`] keeps a local view of the shared conversation in step with the
//!   backend and tears the session down when the backend rejects it.
//! - [`profile`] reads and edits the signed-in account.
//!
//! Transports plug in through [`chat_backend::ChatBackend`].

pub mod config;
pub mod logging;
pub mod navigation;
pub mod profile;
pub mod sync;

pub use config::{ConfigError, EnvConfig, SyncConfig};
pub use navigation::{decide, decide_path, Decision, Navigator, Route};
pub use profile::ProfileService;
pub use sync::{
    ConversationView, ReconcilePolicy, SendOutcome, SkipReason, SyncEngine, SyncError, SyncEvent,
    SyncHandle, SyncPhase, SyncSnapshot,
};
