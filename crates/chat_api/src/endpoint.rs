use url::Url;

use crate::error::ChatApiError;

/// Default backend origin for local development.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// REST endpoints of the chat backend, relative to the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Register,
    Login,
    Logout,
    Messages,
    Profile,
}

impl Endpoint {
    /// Path relative to the base URL, always with a trailing slash.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Register => "api/auth/register/",
            Self::Login => "api/auth/login/",
            Self::Logout => "api/auth/logout/",
            Self::Messages => "api/messages/",
            Self::Profile => "api/profile/",
        }
    }
}

/// Parse a base URL so endpoint paths join under it.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) only `http` and `https` are accepted
/// 3) the path always ends in `/`, so a prefix like `/chat` is kept on join
pub fn normalize_base_url(input: &str) -> Result<Url, ChatApiError> {
    let raw = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let mut url = Url::parse(raw)
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{raw}: {error}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Join `endpoint` onto a normalized base URL.
pub fn endpoint_url(base: &Url, endpoint: Endpoint) -> Result<Url, ChatApiError> {
    base.join(endpoint.path())
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{base}: {error}")))
}
