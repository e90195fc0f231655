//! Sends requests to the records service with the current credentials.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};

use super::error::ApiError;
use super::request::{ApiResponse, AuthMode, PendingRequest};
use crate::auth::store::CredentialStore;

/// User-Agent header for labtrack API requests.
pub const USER_AGENT: &str = concat!("labtrack/", env!("CARGO_PKG_VERSION"));

/// Attaches the bearer token and applies the timeout. Never retries.
pub struct Dispatcher {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            store,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Sends `request` once.
    ///
    /// Non-success statuses are returned as a normal [`ApiResponse`]; only
    /// transport failures and timeouts become errors.
    pub async fn send(&self, request: &PendingRequest) -> Result<ApiResponse, ApiError> {
        // Read as late as possible so a renewal finished by another task is picked up.
        let token = match &request.auth {
            AuthMode::Stored => self.store.access_token()?,
            AuthMode::Bearer(token) => Some(token.clone()),
            AuthMode::Anonymous => None,
        };

        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(CONTENT_TYPE, "application/json");

        if let Some(timeout) = request.timeout.or(self.timeout) {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &request.headers {
            // The attached token wins, including on replay after renewal.
            if token.is_some() && name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            retried = request.is_retried(),
            "sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(path = %request.path, %status, "response received");

        Ok(ApiResponse {
            status,
            body,
            sent_with: token,
        })
    }
}
