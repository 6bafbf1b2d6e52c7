use std::fmt;

use chat_backend::{classify_status, BackendError};
use reqwest::StatusCode;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum ChatApiError {
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
}

impl ChatApiError {
    /// Whether the backend rejected the credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status(StatusCode::UNAUTHORIZED, _))
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, body) => write!(f, "HTTP {status} {body}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<ChatApiError> for BackendError {
    fn from(error: ChatApiError) -> Self {
        match error {
            ChatApiError::Status(status, body) => classify_status(status.as_u16(), &body),
            ChatApiError::Request(error) => BackendError::Network {
                status: error.status().map(|status| status.as_u16()),
                message: error.to_string(),
            },
            other => BackendError::network(other.to_string()),
        }
    }
}
