use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Upper bound on message text length, counted in UTF-16 code units.
pub const MESSAGE_TEXT_MAX_UNITS: usize = 5000;
/// Window size requested by each feed poll.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Opaque credential returned by register/login.
///
/// `Debug` output is redacted so tokens never reach logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a raw token string, rejecting empty or whitespace-only values.
    #[must_use]
    pub fn parse(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Author reference embedded in a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub username: String,
}

impl Author {
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// One message of the shared conversation. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Avatar initials: the first two characters of the author name, uppercased.
    #[must_use]
    pub fn author_initials(&self) -> String {
        match &self.author {
            Some(author) if !author.username.is_empty() => author
                .username
                .chars()
                .take(2)
                .flat_map(char::to_uppercase)
                .collect(),
            _ => "?".to_owned(),
        }
    }

    #[must_use]
    pub fn author_id(&self) -> Option<u64> {
        self.author.as_ref().map(|author| author.id)
    }
}

/// Length of `text` in UTF-16 code units, the unit the text limit is expressed in.
#[must_use]
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Bounded window into the message feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl PageRequest {
    #[must_use]
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub results: Vec<Message>,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Account fields returned alongside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of a register or login response.
///
/// Register answers with the account fields at the top level, login nests
/// them under `user`; both shapes deserialize into this type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<Account>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthResponse {
    /// The issued token, if the backend returned a usable one.
    #[must_use]
    pub fn auth_token(&self) -> Option<AuthToken> {
        self.token.clone().and_then(AuthToken::parse)
    }

    #[must_use]
    pub fn account(&self) -> Option<Account> {
        if let Some(user) = &self.user {
            return Some(user.clone());
        }
        match (self.id, &self.username) {
            (Some(id), Some(username)) => Some(Account {
                id,
                username: username.clone(),
                email: self.email.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Partial profile update; absent fields are left untouched by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}
