//! Access-token renewal on 401 with a single replay.
//!
//! Per request the coordinator walks
//! `Sent → Failed → RenewalInFlight → RenewalSucceeded | RenewalFailed → Replayed | Abandoned`.
//! A request is replayed at most once; a replay that fails again is handed
//! back unchanged. When renewal fails the credential pair and session are
//! torn down and the navigator is sent to sign-in, and the caller receives
//! the original 401.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::dispatcher::Dispatcher;
use super::error::ApiError;
use super::request::{ApiResponse, AuthMode, PendingRequest};
use crate::auth::session::SessionState;
use crate::auth::store::{CredentialStore, mask_token};
use crate::ports::{Navigator, Route};

pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Where a request is in the renewal protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Sent,
    Failed,
    RenewalInFlight,
    RenewalSucceeded,
    RenewalFailed,
    Replayed,
    Abandoned,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum RenewalError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("refresh rejected (HTTP {0})")]
    Rejected(StatusCode),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct RenewalCoordinator {
    dispatcher: Dispatcher,
    store: Arc<dyn CredentialStore>,
    session: SessionState,
    navigator: Arc<dyn Navigator>,
    /// Serialises renewals when single-flight is enabled.
    renewal_guard: Option<Mutex<()>>,
}

impl RenewalCoordinator {
    pub fn new(
        dispatcher: Dispatcher,
        store: Arc<dyn CredentialStore>,
        session: SessionState,
        navigator: Arc<dyn Navigator>,
        single_flight: bool,
    ) -> Self {
        Self {
            dispatcher,
            store,
            session,
            navigator,
            renewal_guard: single_flight.then(|| Mutex::new(())),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Sends `request`, renewing the session and replaying once on 401.
    ///
    /// Returns the final response whatever its status; transport failures of
    /// the request itself are returned as errors and never retried.
    pub async fn execute(&self, mut request: PendingRequest) -> Result<ApiResponse, ApiError> {
        loop {
            let response = self.dispatcher.send(&request).await?;
            trace_state(&request, RequestState::Sent);

            if !response.is_unauthorized() || request.auth == AuthMode::Anonymous {
                if request.is_retried() {
                    trace_state(&request, RequestState::Replayed);
                }
                return Ok(response);
            }
            trace_state(&request, RequestState::Failed);

            if request.is_retried() {
                trace_state(&request, RequestState::Abandoned);
                return Ok(response);
            }

            trace_state(&request, RequestState::RenewalInFlight);
            match self.renew(response.sent_with.as_deref()).await {
                Ok(access_token) => {
                    trace_state(&request, RequestState::RenewalSucceeded);
                    request.prepare_replay(access_token);
                }
                Err(err) => {
                    trace_state(&request, RequestState::RenewalFailed);
                    tracing::warn!(path = %request.path, error = %err, "session renewal failed");
                    self.end_session();
                    return Ok(response);
                }
            }
        }
    }

    /// Obtains a fresh access token, or reuses one another task just obtained.
    async fn renew(&self, failed_with: Option<&str>) -> Result<String, RenewalError> {
        let _permit = match &self.renewal_guard {
            Some(guard) => Some(guard.lock().await),
            None => None,
        };

        let current = self.store.load()?;

        if self.renewal_guard.is_some()
            && let Some(pair) = &current
            && failed_with != Some(pair.access_token.as_str())
        {
            tracing::debug!(
                token = %mask_token(&pair.access_token),
                "access token already renewed by a concurrent request"
            );
            return Ok(pair.access_token.clone());
        }

        let Some(pair) = current else {
            return Err(RenewalError::MissingRefreshToken);
        };
        let Some(refresh_token) = pair.refresh_token.clone() else {
            return Err(RenewalError::MissingRefreshToken);
        };

        let request = PendingRequest::post(REFRESH_PATH)
            .json(&json!({ "refresh_token": refresh_token }))?
            .anonymous();
        let response = self.dispatcher.send(&request).await?;
        if !response.is_success() {
            return Err(RenewalError::Rejected(response.status));
        }

        let renewed: RefreshResponse = response.json()?;
        let next = pair.renewed(renewed.access_token, renewed.refresh_token);
        self.store.save(&next)?;

        tracing::info!(token = %mask_token(&next.access_token), "access token renewed");
        Ok(next.access_token)
    }

    /// Clears credentials and session, then redirects to sign-in.
    fn end_session(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %format!("{err:#}"), "failed to clear stored credentials");
        }
        self.session.clear();
        self.navigator.navigate(Route::SignIn);
    }
}

fn trace_state(request: &PendingRequest, state: RequestState) {
    tracing::debug!(
        method = %request.method,
        path = %request.path,
        state = ?state,
        "request state"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::api::ApiError;
    use crate::api::request::PendingRequest;
    use crate::auth::store::{CredentialPair, CredentialStore};
    use crate::ports::Route;
    use crate::test_support::{Harness, patient};

    fn stored(access: &str, refresh: &str) -> Option<CredentialPair> {
        Some(CredentialPair::new(access, Some(refresh.to_string())))
    }

    async fn mount_records(server: &MockServer, token: &str, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path("/test-records"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!([])))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn mount_refresh(server: &MockServer, refresh: &str, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(body_json(json!({ "refresh_token": refresh })))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_expired_token_is_renewed_and_request_replayed_once() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_records(&server, "A2", 200, 1).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        let response = h
            .ctx
            .client
            .execute(PendingRequest::get("/test-records"))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(
            h.store.load().unwrap(),
            Some(CredentialPair::new("A2", Some("R1".to_string())))
        );
        assert!(h.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_records(&server, "A2", 200, 1).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A2", "refresh_token": "R2" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        h.ctx
            .client
            .execute(PendingRequest::get("/test-records"))
            .await
            .unwrap();

        assert_eq!(
            h.store.load().unwrap(),
            Some(CredentialPair::new("A2", Some("R2".to_string())))
        );
    }

    #[tokio::test]
    async fn test_replay_failure_is_not_retried_again() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_records(&server, "A2", 401, 1).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        let err = h
            .ctx
            .client
            .get_json::<serde_json::Value>("/test-records")
            .await
            .unwrap_err();

        assert!(err.is_unauthorized(), "got {err:?}");
        // The renewal itself succeeded, so the session stays in place.
        assert_eq!(h.store.access_token().unwrap().as_deref(), Some("A2"));
        assert!(h.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_refresh_tears_down_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test-records"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid refresh token" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        h.ctx.session.set_session(patient());

        let err = h
            .ctx
            .client
            .get_json::<serde_json::Value>("/test-records")
            .await
            .unwrap_err();

        // The caller sees the original failure, not the refresh rejection.
        assert!(
            matches!(&err, ApiError::Unauthorized { message } if message == "Token expired"),
            "got {err:?}"
        );
        assert!(h.store.load().unwrap().is_none());
        assert!(h.ctx.session.session().is_none());
        assert_eq!(h.navigator.routes(), vec![Route::SignIn]);
    }

    #[tokio::test]
    async fn test_refresh_network_failure_tears_down_session() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A2" }))
                .set_delay(Duration::from_secs(2)),
            1,
        )
        .await;

        let h = Harness::with_timeout(
            &server.uri(),
            stored("A1", "R1"),
            Duration::from_millis(200),
        );
        let result = h
            .ctx
            .client
            .execute(PendingRequest::get("/test-records"))
            .await
            .unwrap();

        assert!(result.is_unauthorized());
        assert!(h.store.load().unwrap().is_none());
        assert_eq!(h.navigator.routes(), vec![Route::SignIn]);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_tears_down_without_refresh_call() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_refresh(&server, "R1", ResponseTemplate::new(200), 0).await;

        let h = Harness::new(&server.uri(), Some(CredentialPair::new("A1", None)));
        let response = h
            .ctx
            .client
            .execute(PendingRequest::get("/test-records"))
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        assert!(h.store.load().unwrap().is_none());
        assert_eq!(h.navigator.routes(), vec![Route::SignIn]);
    }

    #[tokio::test]
    async fn test_undecodable_refresh_response_tears_down() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 1).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200).set_body_json(json!({ "token": "A2" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        let response = h
            .ctx
            .client
            .execute(PendingRequest::get("/test-records"))
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_401_failures_pass_through() {
        let server = MockServer::start().await;
        for (route, status) in [("/forbidden", 403), ("/broken", 500), ("/missing", 404)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;
        }
        mount_refresh(&server, "R1", ResponseTemplate::new(200), 0).await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        for (route, status) in [("/forbidden", 403), ("/broken", 500), ("/missing", 404)] {
            let response = h
                .ctx
                .client
                .execute(PendingRequest::get(route))
                .await
                .unwrap();
            assert_eq!(response.status.as_u16(), status);
        }

        assert_eq!(h.store.access_token().unwrap().as_deref(), Some("A1"));
        assert!(h.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_401_does_not_renew() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "R1", ResponseTemplate::new(200), 0).await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        let response = h
            .ctx
            .client
            .execute(PendingRequest::post("/api/auth/login").anonymous())
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        assert!(h.store.load().unwrap().is_some());
        assert!(h.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_renewal() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 2).await;
        mount_records(&server, "A2", 200, 2).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })),
            1,
        )
        .await;

        let h = Harness::new(&server.uri(), stored("A1", "R1"));
        let client = &h.ctx.client;
        let (first, second) = tokio::join!(
            client.execute(PendingRequest::get("/test-records")),
            client.execute(PendingRequest::get("/test-records")),
        );

        assert!(first.unwrap().is_success());
        assert!(second.unwrap().is_success());
        assert_eq!(h.store.access_token().unwrap().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_without_single_flight_each_failure_renews() {
        let server = MockServer::start().await;
        mount_records(&server, "A1", 401, 2).await;
        mount_records(&server, "A2", 200, 2).await;
        mount_refresh(
            &server,
            "R1",
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })),
            2,
        )
        .await;

        let h = Harness::independent_renewals(&server.uri(), stored("A1", "R1"));
        let client = &h.ctx.client;
        let (first, second) = tokio::join!(
            client.execute(PendingRequest::get("/test-records")),
            client.execute(PendingRequest::get("/test-records")),
        );

        assert!(first.unwrap().is_success());
        assert!(second.unwrap().is_success());
    }
}
