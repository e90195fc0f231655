//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::AppContext;
use crate::auth::session::{Role, Session};
use crate::auth::store::{CredentialPair, MemoryCredentialStore};
use crate::config::ClientSettings;
use crate::ports::{Navigator, Notice, Notifier, Route};

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub(crate) fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// An [`AppContext`] wired to an in-memory store and recording ports.
pub(crate) struct Harness {
    pub ctx: AppContext,
    pub store: Arc<MemoryCredentialStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub(crate) fn new(base_url: &str, pair: Option<CredentialPair>) -> Self {
        Self::with_settings(ClientSettings::new(base_url), pair)
    }

    pub(crate) fn with_timeout(
        base_url: &str,
        pair: Option<CredentialPair>,
        timeout: Duration,
    ) -> Self {
        let mut settings = ClientSettings::new(base_url);
        settings.request_timeout = Some(timeout);
        Self::with_settings(settings, pair)
    }

    pub(crate) fn independent_renewals(base_url: &str, pair: Option<CredentialPair>) -> Self {
        let mut settings = ClientSettings::new(base_url);
        settings.single_flight = false;
        Self::with_settings(settings, pair)
    }

    fn with_settings(settings: ClientSettings, pair: Option<CredentialPair>) -> Self {
        let store = Arc::new(match pair {
            Some(pair) => MemoryCredentialStore::with_pair(pair),
            None => MemoryCredentialStore::new(),
        });
        let navigator = Arc::new(RecordingNavigator::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = AppContext::new(
            &settings,
            Arc::clone(&store) as _,
            Arc::clone(&navigator) as _,
            Arc::clone(&notifier) as _,
        );
        Self {
            ctx,
            store,
            navigator,
            notifier,
        }
    }
}

pub(crate) fn patient() -> Session {
    Session {
        user_id: "u-1".to_string(),
        email: "pat@example.com".to_string(),
        role: Role::Patient,
        first_name: "Pat".to_string(),
        last_name: "Doe".to_string(),
        email_verified: true,
    }
}

pub(crate) fn patient_json() -> Value {
    json!({
        "id": "u-1",
        "email": "pat@example.com",
        "role": "patient",
        "firstName": "Pat",
        "lastName": "Doe",
        "emailVerified": true
    })
}
