use std::collections::BTreeMap;

use chat_backend::AuthToken;

use crate::config::ChatApiConfig;
use crate::error::ChatApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Scheme keyword the backend expects in front of the token.
pub const TOKEN_KEYWORD: &str = "Token";

/// Build a deterministic header map for one request.
///
/// `token` is attached as `Authorization: Token <token>` when present. Extra
/// headers from the config are lowercased and cannot replace the
/// authorization header.
pub fn build_headers(
    config: &ChatApiConfig,
    token: Option<&AuthToken>,
) -> Result<BTreeMap<String, String>, ChatApiError> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);

    for (key, value) in &config.extra_headers {
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() || key == HEADER_AUTHORIZATION {
            continue;
        }
        headers.insert(key, value.trim().to_owned());
    }

    if let Some(token) = token {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), authorization_value(token)?);
    }

    Ok(headers)
}

/// `Token <token>`; tokens with whitespace cannot be sent in this scheme.
pub fn authorization_value(token: &AuthToken) -> Result<String, ChatApiError> {
    let raw = token.as_str().trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return Err(ChatApiError::InvalidHeader(
            "token must be a single non-empty word".to_owned(),
        ));
    }
    Ok(format!("{TOKEN_KEYWORD} {raw}"))
}

fn default_user_agent() -> String {
    format!("chat_api/{}", env!("CARGO_PKG_VERSION"))
}
