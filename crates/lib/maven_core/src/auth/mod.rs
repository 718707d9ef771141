//! Authentication and single-sign-on logic.
//!
//! Provides the signed-token codec, password verification, the session
//! authority that resolves principals, the cross-domain SSO bridge and the
//! admin-link protocol. Shared by `maven_api` and the server binary.

pub mod admin_link;
pub mod discord;
pub mod password;
pub mod redirect;
pub mod session;
pub mod sso;
pub mod token;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required secret, origin or domain is not configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Signature, structure, audience, issuer or expiry check failed.
    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    #[error("Redirect target not allowed")]
    InvalidRedirectTarget,

    /// Unknown user or wrong password; never distinguished.
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
