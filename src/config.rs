//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chat_api::{ChatApiConfig, DEFAULT_BASE_URL};
use chat_backend::{PageRequest, DEFAULT_PAGE_LIMIT};
use session_store::SessionStoreError;
use thiserror::Error;

use crate::logging::DEFAULT_FILTER;
use crate::sync::ReconcilePolicy;

pub const ENV_BASE_URL: &str = "CHAT_SYNC_BASE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "CHAT_SYNC_POLL_INTERVAL_MS";
pub const ENV_PAGE_LIMIT: &str = "CHAT_SYNC_PAGE_LIMIT";
pub const ENV_TIMEOUT_SEC: &str = "CHAT_SYNC_TIMEOUT_SEC";
pub const ENV_TOKEN_PATH: &str = "CHAT_SYNC_TOKEN_PATH";
pub const ENV_RECONCILE: &str = "CHAT_SYNC_RECONCILE";
pub const ENV_LOG: &str = "CHAT_SYNC_LOG";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const MAX_PAGE_LIMIT: u32 = 1000;
/// Grace used by `retain-pending` when no count is given.
pub const DEFAULT_GRACE_POLLS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Invalid {
            key,
            value: value.to_owned(),
            reason,
        }
    }
}

/// Tuning for one sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Window requested by every poll; it never moves.
    pub page: PageRequest,
    pub reconcile: ReconcilePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            page: PageRequest::default(),
            reconcile: ReconcilePolicy::default(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page = PageRequest::new(limit, 0);
        self
    }

    #[must_use]
    pub fn with_reconcile(mut self, reconcile: ReconcilePolicy) -> Self {
        self.reconcile = reconcile;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub page_limit: u32,
    pub timeout: Option<Duration>,
    pub token_path: Option<PathBuf>,
    pub reconcile: ReconcilePolicy,
    pub log_filter: String,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_interval = match env_string_opt(ENV_POLL_INTERVAL_MS) {
            Some(raw) => Duration::from_millis(parse_positive(ENV_POLL_INTERVAL_MS, &raw)?),
            None => DEFAULT_POLL_INTERVAL,
        };
        let page_limit = match env_string_opt(ENV_PAGE_LIMIT) {
            Some(raw) => parse_page_limit(&raw)?,
            None => DEFAULT_PAGE_LIMIT,
        };
        let timeout = env_string_opt(ENV_TIMEOUT_SEC)
            .map(|raw| parse_positive(ENV_TIMEOUT_SEC, &raw).map(Duration::from_secs))
            .transpose()?;
        let reconcile = match env_string_opt(ENV_RECONCILE) {
            Some(raw) => parse_reconcile(&raw)?,
            None => ReconcilePolicy::default(),
        };

        Ok(Self {
            base_url: env_string_opt(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            poll_interval,
            page_limit,
            timeout,
            token_path: env_string_opt(ENV_TOKEN_PATH).map(PathBuf::from),
            reconcile,
            log_filter: env_string_opt(ENV_LOG).unwrap_or_else(|| DEFAULT_FILTER.to_owned()),
        })
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_poll_interval(self.poll_interval)
            .with_page_limit(self.page_limit)
            .with_reconcile(self.reconcile)
    }

    #[must_use]
    pub fn api_config(&self) -> ChatApiConfig {
        let config = ChatApiConfig::new(&self.base_url);
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }

    /// The configured credential file, or the per-user default.
    pub fn resolve_token_path(&self) -> Result<PathBuf, SessionStoreError> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => session_store::default_token_path(),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_owned())
        }
    })
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, raw, "must be greater than zero")),
        Ok(value) => Ok(value),
        Err(_) => Err(ConfigError::invalid(key, raw, "expected a whole number")),
    }
}

fn parse_page_limit(raw: &str) -> Result<u32, ConfigError> {
    let limit = raw
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(ENV_PAGE_LIMIT, raw, "expected a whole number"))?;
    if (1..=MAX_PAGE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(ConfigError::invalid(ENV_PAGE_LIMIT, raw, "must be between 1 and 1000"))
    }
}

/// `replace`, `retain-pending`, or `retain-pending:<grace polls>`.
fn parse_reconcile(raw: &str) -> Result<ReconcilePolicy, ConfigError> {
    let (mode, grace) = match raw.split_once(':') {
        Some((mode, grace)) => (mode, Some(grace)),
        None => (raw, None),
    };
    match (mode.to_ascii_lowercase().as_str(), grace) {
        ("replace", None) => Ok(ReconcilePolicy::ReplaceWindow),
        ("retain-pending", None) => Ok(ReconcilePolicy::RetainPending {
            grace_polls: DEFAULT_GRACE_POLLS,
        }),
        ("retain-pending", Some(grace)) => grace
            .parse::<u32>()
            .map(|grace_polls| ReconcilePolicy::RetainPending { grace_polls })
            .map_err(|_| ConfigError::invalid(ENV_RECONCILE, raw, "grace must be a whole number")),
        _ => Err(ConfigError::invalid(
            ENV_RECONCILE,
            raw,
            "expected replace or retain-pending[:N]",
        )),
    }
}
