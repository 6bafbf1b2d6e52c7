//! Authentication session ownership.
//!
//! [`SessionStore`] is the single writer of the authentication token. Readers
//! (navigation, sync) only ever see a synchronous snapshot of it. The token is
//! persisted through a [`TokenStorage`] slot so a session survives restarts.

mod error;
mod storage;
mod store;

pub use error::SessionStoreError;
pub use storage::{
    default_token_path, FileTokenStorage, MemoryTokenStorage, TokenStorage, TOKEN_DIR,
    TOKEN_FILE_NAME, TOKEN_KEY,
};
pub use store::{Ack, Session, SessionStore};
