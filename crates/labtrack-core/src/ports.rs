//! Outbound ports to the UI layer: navigation and user-visible notices.

/// Navigation targets the core can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    VerifyEmail,
    Dashboard,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::SignIn => "/signin",
            Route::VerifyEmail => "/verify-email",
            Route::Dashboard => "/dashboard",
        }
    }
}

/// Performs navigation on behalf of the core, e.g. the redirect to sign-in
/// after an unrecoverable renewal failure.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// A short user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Notice::Success(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice::Error(message.into())
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
