//! Wiring for one running client instance.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::lifecycle::SessionController;
use crate::auth::session::SessionState;
use crate::auth::store::CredentialStore;
use crate::config::ClientSettings;
use crate::ports::{Navigator, Notifier};
use crate::records::RecordsApi;

/// Every handle shares one credential store and one session state.
pub struct AppContext {
    pub client: ApiClient,
    pub session: SessionState,
    pub controller: SessionController,
    pub records: RecordsApi,
}

impl AppContext {
    pub fn new(
        settings: &ClientSettings,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let session = SessionState::new();
        let client = ApiClient::new(
            settings,
            Arc::clone(&store),
            session.clone(),
            Arc::clone(&navigator),
        );
        let controller = SessionController::new(
            client.clone(),
            store,
            session.clone(),
            navigator,
            notifier,
        );
        Self {
            records: RecordsApi::new(client.clone()),
            client,
            session,
            controller,
        }
    }
}
