//! Request descriptors and raw responses.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;

/// Where the bearer token for a request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Read the access token from the credential store right before send.
    Stored,
    /// Use this token. Set on replay after a renewal.
    Bearer(String),
    /// Send without credentials. A 401 on such a request is never treated as
    /// an expired access token.
    Anonymous,
}

/// An outgoing call, kept intact so it can be replayed once.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Overrides the dispatcher's default timeout.
    pub timeout: Option<Duration>,
    pub auth: AuthMode,
    retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            auth: AuthMode::Stored,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attaches a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.auth = AuthMode::Anonymous;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Marks the request as replayed and pins the renewed access token.
    pub(crate) fn prepare_replay(&mut self, access_token: String) {
        self.retried = true;
        self.auth = AuthMode::Bearer(access_token);
    }
}

/// A completed HTTP exchange, successful or not.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
    /// Access token that was attached to the request, if any.
    pub(crate) sent_with: Option<String>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Converts a non-success response into the matching [`ApiError`].
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_response(self.status, &self.body))
        }
    }
}
