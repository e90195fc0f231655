//! Renewal-aware client used by everything above the transport.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::dispatcher::Dispatcher;
use super::error::ApiError;
use super::renewal::RenewalCoordinator;
use super::request::{ApiResponse, PendingRequest};
use crate::auth::session::SessionState;
use crate::auth::store::CredentialStore;
use crate::config::ClientSettings;
use crate::ports::Navigator;

/// Cheap-to-clone handle; clones share the dispatcher and renewal state.
#[derive(Clone)]
pub struct ApiClient {
    coordinator: Arc<RenewalCoordinator>,
}

impl ApiClient {
    pub fn new(
        settings: &ClientSettings,
        store: Arc<dyn CredentialStore>,
        session: SessionState,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            settings.base_url.clone(),
            Arc::clone(&store),
            settings.request_timeout,
        );
        let coordinator = RenewalCoordinator::new(
            dispatcher,
            store,
            session,
            navigator,
            settings.single_flight,
        );
        Self {
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn base_url(&self) -> &str {
        self.coordinator.dispatcher().base_url()
    }

    /// Sends `request` through the renewal coordinator and returns the final
    /// response, whatever its status.
    pub async fn execute(&self, request: PendingRequest) -> Result<ApiResponse, ApiError> {
        self.coordinator.execute(request).await
    }

    /// Like [`execute`](Self::execute), but non-success statuses become errors.
    pub async fn send(&self, request: PendingRequest) -> Result<ApiResponse, ApiError> {
        self.execute(request).await?.error_for_status()
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(PendingRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(PendingRequest::post(path).json(body)?).await
    }
}
