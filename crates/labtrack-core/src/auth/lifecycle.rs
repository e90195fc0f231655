//! Session lifecycle: login, registration, startup verification, logout.
//!
//! Every operation here updates the credential store and the session state
//! together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::session::{Session, SessionState};
use super::store::{CredentialPair, CredentialStore};
use crate::api::{ApiClient, ApiError, PendingRequest};
use crate::ports::{Navigator, Notice, Notifier, Route};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const VERIFY_PATH: &str = "/api/auth/verify";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const VERIFY_EMAIL_PATH: &str = "/api/auth/verify-email";
pub const RESEND_VERIFICATION_PATH: &str = "/api/auth/resend-verification";
pub const FORGOT_PASSWORD_PATH: &str = "/api/auth/forgot-password";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    remember_me: bool,
}

/// Credentials issued by login.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    user: Session,
}

/// New-account details sent to the registration endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationProfile {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for RegistrationProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationProfile")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

/// The two shapes the registration endpoint may answer with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegisterResponse {
    /// Legacy services issue credentials straight away.
    Issued {
        #[serde(alias = "access_token")]
        token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        user: Session,
    },
    Pending {
        #[serde(rename = "requiresVerification")]
        requires_verification: bool,
        email: String,
    },
}

/// Result of [`SessionController::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No credentials yet; the user has to confirm `email` first.
    VerificationRequired { email: String },
    /// Credentials were issued and the session is established.
    Registered { email: String, session: Session },
}

impl RegisterOutcome {
    pub fn requires_verification(&self) -> bool {
        matches!(self, RegisterOutcome::VerificationRequired { .. })
    }

    pub fn email(&self) -> &str {
        match self {
            RegisterOutcome::VerificationRequired { email }
            | RegisterOutcome::Registered { email, .. } => email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyEmailResponse {
    #[serde(alias = "access_token")]
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyEmailRequest<'a> {
    email: &'a str,
    code: &'a str,
}

/// Establishes, validates and tears down sessions.
pub struct SessionController {
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    session: SessionState,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
}

impl SessionController {
    pub fn new(
        client: ApiClient,
        store: Arc<dyn CredentialStore>,
        session: SessionState,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client,
            store,
            session,
            navigator,
            notifier,
        }
    }

    /// Exchanges email and password for credentials and loads the identity.
    ///
    /// `remember_me` is forwarded as-is; token lifetime is the service's call.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, ApiError> {
        let result = self.try_login(email, password, remember_me).await;
        match &result {
            Ok(session) => {
                tracing::info!(user = %session.email, "logged in");
                self.notifier.notify(Notice::success("Successfully logged in!"));
                self.navigator.navigate(Route::Dashboard);
            }
            Err(err) => self.notifier.notify(Notice::error(err.user_message("Login failed"))),
        }
        result
    }

    async fn try_login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, ApiError> {
        let request = PendingRequest::post(LOGIN_PATH)
            .json(&LoginRequest {
                email,
                password,
                remember_me,
            })?
            .anonymous();
        let tokens: TokenResponse = self.client.send_json(request).await?;

        self.sign_in_with(CredentialPair::new(tokens.access_token, tokens.refresh_token))
            .await
    }

    /// Creates an account.
    ///
    /// Nothing is stored when the service asks for email verification; when
    /// it issues credentials right away they are stored and the session is set.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<RegisterOutcome, ApiError> {
        let result = self.try_register(profile).await;
        match &result {
            Ok(RegisterOutcome::VerificationRequired { .. }) => {
                self.notifier.notify(Notice::success(
                    "Registration successful! Please check your email for verification code.",
                ));
                self.navigator.navigate(Route::VerifyEmail);
            }
            Ok(RegisterOutcome::Registered { email, .. }) => {
                tracing::info!(user = %email, "registered and logged in");
                self.notifier.notify(Notice::success("Account created successfully!"));
                self.navigator.navigate(Route::Dashboard);
            }
            Err(err) => self
                .notifier
                .notify(Notice::error(err.user_message("Registration failed"))),
        }
        result
    }

    async fn try_register(&self, profile: &RegistrationProfile) -> Result<RegisterOutcome, ApiError> {
        let request = PendingRequest::post(REGISTER_PATH).json(profile)?.anonymous();
        let response: RegisterResponse = self.client.send_json(request).await?;

        match response {
            RegisterResponse::Pending {
                requires_verification: true,
                email,
            } => Ok(RegisterOutcome::VerificationRequired { email }),
            RegisterResponse::Pending {
                requires_verification: false,
                ..
            } => Err(ApiError::UnexpectedResponse(
                "registration returned neither credentials nor a verification request".to_string(),
            )),
            RegisterResponse::Issued {
                token,
                refresh_token,
                user,
            } => {
                self.store.save(&CredentialPair::new(token, refresh_token))?;
                self.session.set_session(user.clone());
                Ok(RegisterOutcome::Registered {
                    email: user.email.clone(),
                    session: user,
                })
            }
        }
    }

    /// Validates stored credentials on startup.
    ///
    /// Without stored credentials this returns immediately and makes no
    /// network call. On failure the stored pair is cleared and the session
    /// stays absent. `loading` is false afterwards in every case.
    pub async fn verify_session(&self) -> Result<Option<Session>, ApiError> {
        let result = self.try_verify_session().await;
        match &result {
            Ok(Some(session)) => self.session.set_session(session.clone()),
            Ok(None) => {}
            Err(err) => {
                tracing::info!(error = %err, "stored session could not be verified");
                self.discard_credentials();
            }
        }
        self.session.finish_loading();
        result
    }

    async fn try_verify_session(&self) -> Result<Option<Session>, ApiError> {
        if self.store.load()?.is_none() {
            return Ok(None);
        }
        self.fetch_identity().await.map(Some)
    }

    /// Clears credentials and session locally. No network call is made.
    ///
    /// Returns whether credentials were stored.
    pub fn logout(&self) -> Result<bool, ApiError> {
        self.session.clear();
        let had_credentials = self.store.clear()?;
        tracing::info!("logged out");
        self.notifier.notify(Notice::success("Logged out successfully"));
        Ok(had_credentials)
    }

    /// Consumes an email verification code and signs the user in.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<Session, ApiError> {
        let result = self.try_verify_email(email, code).await;
        match &result {
            Ok(_) => {
                self.notifier
                    .notify(Notice::success("Email verified successfully!"));
                self.navigator.navigate(Route::Dashboard);
            }
            Err(err) => self
                .notifier
                .notify(Notice::error(err.user_message("Verification failed"))),
        }
        result
    }

    async fn try_verify_email(&self, email: &str, code: &str) -> Result<Session, ApiError> {
        let request = PendingRequest::post(VERIFY_EMAIL_PATH)
            .json(&VerifyEmailRequest { email, code })?
            .anonymous();
        let response: VerifyEmailResponse = self.client.send_json(request).await?;

        self.sign_in_with(CredentialPair::new(response.token, response.refresh_token))
            .await
    }

    /// Asks the service to send a new verification code.
    pub async fn resend_verification(&self, email: &str) -> Result<(), ApiError> {
        let result = self
            .post_anonymous(RESEND_VERIFICATION_PATH, &EmailRequest { email })
            .await;
        match &result {
            Ok(()) => self
                .notifier
                .notify(Notice::success("Verification code sent successfully!")),
            Err(err) => self
                .notifier
                .notify(Notice::error(err.user_message("Failed to resend code"))),
        }
        result
    }

    /// Requests a password reset email.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let result = self
            .post_anonymous(FORGOT_PASSWORD_PATH, &EmailRequest { email })
            .await;
        match &result {
            Ok(()) => self
                .notifier
                .notify(Notice::success("Password reset instructions sent to your email")),
            Err(err) => self
                .notifier
                .notify(Notice::error(err.user_message("Failed to send reset email"))),
        }
        result
    }

    /// Returns the current session, redirecting to sign-in when there is none.
    pub fn require_session(&self) -> Result<Session, ApiError> {
        let snapshot = self.session.snapshot();
        match snapshot.session {
            Some(session) => Ok(session),
            None => {
                if !snapshot.loading {
                    self.navigator.navigate(Route::SignIn);
                }
                Err(ApiError::Unauthorized {
                    message: "Not signed in".to_string(),
                })
            }
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Stores `pair` and loads the identity; the pair is removed again if
    /// that fails.
    async fn sign_in_with(&self, pair: CredentialPair) -> Result<Session, ApiError> {
        self.store.save(&pair)?;
        match self.fetch_identity().await {
            Ok(session) => {
                self.session.set_session(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.discard_credentials();
                Err(err)
            }
        }
    }

    fn discard_credentials(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %format!("{err:#}"), "failed to clear stored credentials");
        }
        self.session.clear();
    }

    async fn fetch_identity(&self) -> Result<Session, ApiError> {
        let identity: IdentityResponse = self.client.get_json(VERIFY_PATH).await?;
        Ok(identity.user)
    }

    async fn post_anonymous<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let request = PendingRequest::post(path).json(body)?.anonymous();
        self.client.send(request).await?;
        Ok(())
    }
}
