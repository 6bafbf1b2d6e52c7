//! HTTP transport for the chat backend.
//!
//! This crate owns request building and response parsing for the REST endpoints
//! only. It holds no session state: every authenticated call receives the token
//! from the caller, and every failure is classified into
//! [`chat_backend::BackendError`] before it leaves the [`chat_backend::ChatBackend`]
//! implementation.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod headers;

pub use client::ChatApiClient;
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use endpoint::{normalize_base_url, Endpoint, DEFAULT_BASE_URL};
