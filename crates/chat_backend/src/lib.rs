//! Provider-neutral contract between the chat client engine and a messaging backend.
//!
//! This crate defines the wire-level data types exchanged with the backend, the
//! three-way failure taxonomy every transport must classify into, and the
//! [`ChatBackend`] trait the session store and sync engine call. It contains no
//! transport code; see `chat_api` for the HTTP implementation and
//! `chat_backend_mock` for the scripted in-memory one.

mod error;
mod types;

use async_trait::async_trait;

pub use error::{classify_status, BackendError, FieldErrors};
pub use types::{
    utf16_len, Account, AuthResponse, AuthToken, Author, LoginRequest, Message, MessagePage,
    PageRequest, Profile, ProfileUpdate, RegisterRequest, DEFAULT_PAGE_LIMIT,
    MESSAGE_TEXT_MAX_UNITS,
};

/// Request surface of the messaging backend.
///
/// Every authenticated call takes the token explicitly; implementations never
/// hold credential state of their own. A `401` on any authenticated call must be
/// reported as [`BackendError::Unauthorized`].
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// `POST /api/auth/register/`
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, BackendError>;

    /// `POST /api/auth/login/`
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, BackendError>;

    /// `POST /api/auth/logout/`, invalidating `token` server-side.
    async fn logout(&self, token: &AuthToken) -> Result<(), BackendError>;

    /// `GET /api/messages/?limit&offset`
    async fn list_messages(
        &self,
        token: &AuthToken,
        page: PageRequest,
    ) -> Result<MessagePage, BackendError>;

    /// `POST /api/messages/`
    async fn create_message(&self, token: &AuthToken, text: &str) -> Result<Message, BackendError>;

    /// `GET /api/profile/`
    async fn get_profile(&self, token: &AuthToken) -> Result<Profile, BackendError>;

    /// `PUT /api/profile/`
    async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError>;
}
