//! HTTP access to the records service.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod renewal;
pub mod request;

pub use client::ApiClient;
pub use error::{ApiError, FieldError};
pub use renewal::RequestState;
pub use request::{ApiResponse, AuthMode, PendingRequest};
