//! Credentials and session state.

pub mod lifecycle;
pub mod session;
pub mod store;

pub use lifecycle::{RegisterOutcome, RegistrationProfile, SessionController};
pub use session::{Role, Session, SessionSnapshot, SessionState};
pub use store::{
    CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore, mask_token,
};
