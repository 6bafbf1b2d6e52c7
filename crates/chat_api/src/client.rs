use async_trait::async_trait;
use chat_backend::{
    AuthResponse, AuthToken, BackendError, ChatBackend, LoginRequest, Message, MessagePage,
    PageRequest, Profile, ProfileUpdate, RegisterRequest,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ChatApiConfig;
use crate::endpoint::{endpoint_url, normalize_base_url, Endpoint};
use crate::error::ChatApiError;
use crate::headers::build_headers;

/// Empty JSON object sent as the logout body.
#[derive(Serialize)]
struct EmptyBody {}

#[derive(Serialize)]
struct CreateMessageBody<'a> {
    text: &'a str,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
    base_url: Url,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Result<Url, ChatApiError> {
        endpoint_url(&self.base_url, endpoint)
    }

    pub fn build_headers(&self, token: Option<&AuthToken>) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, token)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Start a request against `endpoint` with the standard header set.
    pub fn build_request(
        &self,
        method: Method,
        endpoint: Endpoint,
        token: Option<&AuthToken>,
    ) -> Result<RequestBuilder, ChatApiError> {
        let url = self.endpoint(endpoint)?;
        let headers = self.build_headers(token)?;
        Ok(self.http.request(method, url).headers(headers))
    }

    pub async fn register_raw(&self, request: &RegisterRequest) -> Result<AuthResponse, ChatApiError> {
        let builder = self
            .build_request(Method::POST, Endpoint::Register, None)?
            .json(request);
        self.execute_json(builder).await
    }

    pub async fn login_raw(&self, request: &LoginRequest) -> Result<AuthResponse, ChatApiError> {
        let builder = self
            .build_request(Method::POST, Endpoint::Login, None)?
            .json(request);
        self.execute_json(builder).await
    }

    pub async fn logout_raw(&self, token: &AuthToken) -> Result<(), ChatApiError> {
        let builder = self
            .build_request(Method::POST, Endpoint::Logout, Some(token))?
            .json(&EmptyBody {});
        self.execute(builder).await.map(|_| ())
    }

    pub async fn list_messages_raw(
        &self,
        token: &AuthToken,
        page: PageRequest,
    ) -> Result<MessagePage, ChatApiError> {
        let builder = self
            .build_request(Method::GET, Endpoint::Messages, Some(token))?
            .query(&[("limit", page.limit), ("offset", page.offset)]);
        self.execute_json(builder).await
    }

    pub async fn create_message_raw(
        &self,
        token: &AuthToken,
        text: &str,
    ) -> Result<Message, ChatApiError> {
        let builder = self
            .build_request(Method::POST, Endpoint::Messages, Some(token))?
            .json(&CreateMessageBody { text });
        self.execute_json(builder).await
    }

    pub async fn get_profile_raw(&self, token: &AuthToken) -> Result<Profile, ChatApiError> {
        let builder = self.build_request(Method::GET, Endpoint::Profile, Some(token))?;
        self.execute_json(builder).await
    }

    pub async fn update_profile_raw(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<Profile, ChatApiError> {
        let builder = self
            .build_request(Method::PUT, Endpoint::Profile, Some(token))?
            .json(update);
        self.execute_json(builder).await
    }

    /// Send `builder` and return the body of a successful response.
    ///
    /// Non-success statuses become [`ChatApiError::Status`] carrying the body text.
    async fn execute(&self, builder: RequestBuilder) -> Result<Vec<u8>, ChatApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?.to_vec());
        }

        let body = response.text().await.unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        debug!(status = status.as_u16(), "backend returned non-success status");
        Err(ChatApiError::Status(status, body))
    }

    async fn execute_json<T>(&self, builder: RequestBuilder) -> Result<T, ChatApiError>
    where
        T: DeserializeOwned,
    {
        let body = self.execute(builder).await?;
        serde_json::from_slice(&body).map_err(ChatApiError::from)
    }
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, BackendError> {
        Ok(self.register_raw(request).await?)
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, BackendError> {
        Ok(self.login_raw(request).await?)
    }

    async fn logout(&self, token: &AuthToken) -> Result<(), BackendError> {
        Ok(self.logout_raw(token).await?)
    }

    async fn list_messages(
        &self,
        token: &AuthToken,
        page: PageRequest,
    ) -> Result<MessagePage, BackendError> {
        Ok(self.list_messages_raw(token, page).await?)
    }

    async fn create_message(&self, token: &AuthToken, text: &str) -> Result<Message, BackendError> {
        Ok(self.create_message_raw(token, text).await?)
    }

    async fn get_profile(&self, token: &AuthToken) -> Result<Profile, BackendError> {
        Ok(self.get_profile_raw(token).await?)
    }

    async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        Ok(self.update_profile_raw(token, update).await?)
    }
}
