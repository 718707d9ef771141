//! Identity store adapter.
//!
//! Resolves or creates the canonical player identity for a provider login,
//! answers admin-privilege queries and looks up credential admins. The
//! PostgreSQL implementation is used in production; the in-memory one backs
//! tests and local runs without a database.

pub mod memory;
pub mod queries;

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::models::auth::{AdminGrant, AdminUser, GrantRequest, IdentityProfile, IdentityRecord};

pub use memory::MemoryIdentityStore;
pub use queries::PgIdentityStore;

/// Keyed identity storage.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert-or-update the identity for `provider_account_id`.
    ///
    /// Existing record: refresh email (when supplied), name, avatar and
    /// last-seen. Otherwise an unlinked record with the same email is
    /// adopted, else a fresh least-privileged record is created. Returns the
    /// provider id.
    async fn upsert_identity(
        &self,
        provider_account_id: &str,
        profile: &IdentityProfile,
    ) -> Result<String, AuthError>;

    async fn find_identity(&self, discord_id: &str) -> Result<Option<IdentityRecord>, AuthError>;

    /// Active grant for the id, if any.
    async fn find_admin_grant(&self, discord_id: &str) -> Result<Option<AdminGrant>, AuthError>;

    /// Stamp the grant's last-login time.
    async fn touch_admin_last_login(&self, discord_id: &str) -> Result<(), AuthError>;

    /// Create or reactivate a grant.
    async fn upsert_admin_grant(&self, grant: &GrantRequest) -> Result<(), AuthError>;

    /// Deactivate a grant. Returns whether an active grant was revoked.
    async fn revoke_admin_grant(
        &self,
        discord_id: &str,
        revoked_by: Option<&str>,
    ) -> Result<bool, AuthError>;

    async fn find_admin_user_by_email(&self, email: &str) -> Result<Option<AdminUser>, AuthError>;

    /// Create a credential admin, returning its id.
    async fn create_admin_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<String, AuthError>;
}
