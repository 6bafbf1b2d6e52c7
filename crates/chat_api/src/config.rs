use std::collections::BTreeMap;
use std::time::Duration;

use crate::endpoint::DEFAULT_BASE_URL;

/// Transport configuration for chat backend requests.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Backend origin; endpoint paths are joined onto it.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional per-request timeout.
    pub timeout: Option<Duration>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
