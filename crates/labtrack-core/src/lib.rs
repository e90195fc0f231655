//! Session and token-refresh core for the labtrack client.
//!
//! - `auth`: credential store, session state and the session lifecycle
//! - `api`: request dispatch, renewal-on-401 and the typed error model
//! - `records`: test-record endpoints built on the renewal-aware client

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod ports;
pub mod records;

pub use context::AppContext;

#[cfg(test)]
pub(crate) mod test_support;
