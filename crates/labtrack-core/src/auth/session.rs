//! In-memory session state shared with the rest of the application.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Account role as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        };
        f.write_str(label)
    }
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "id")]
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    /// Older service versions omit this field.
    #[serde(default)]
    pub email_verified: bool,
}

impl Session {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    /// True until the startup verification has finished. Session-dependent
    /// UI must not render while this is set.
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }
}

/// Shared, subscribable session state.
///
/// Clones share the same underlying state. Readers call [`snapshot`] or
/// [`subscribe`]; only the lifecycle controller and renewal coordinator
/// call the mutating methods.
///
/// [`snapshot`]: SessionState::snapshot
/// [`subscribe`]: SessionState::subscribe
#[derive(Debug, Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    /// Returns a receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn set_session(&self, session: Session) {
        self.tx.send_modify(|state| state.session = Some(session));
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|state| state.session.take().is_some());
    }

    pub fn finish_loading(&self) {
        self.tx.send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }
}
