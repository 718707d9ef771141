//! # maven_core
//!
//! Authentication core for the Maven auth center: signed tokens, principals,
//! the identity store, SSO and admin-link protocols.

pub mod auth;
pub mod identity;
pub mod migrate;
pub mod models;
pub mod notify;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
