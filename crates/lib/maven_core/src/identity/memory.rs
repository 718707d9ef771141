//! In-memory identity store.
//!
//! Mirrors the PostgreSQL semantics, including the one-record-per-provider-id
//! guarantee, behind a single lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::IdentityStore;
use crate::auth::AuthError;
use crate::models::auth::{
    AdminGrant, AdminUser, DEFAULT_ACCOUNT_TYPE, GrantRequest, IdentityProfile, IdentityRecord,
};

#[derive(Debug, Default)]
struct Tables {
    identities: Vec<IdentityRecord>,
    grants: HashMap<String, AdminGrant>,
    admins: Vec<AdminUser>,
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    tables: RwLock<Tables>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw record, e.g. an account created game-side with no
    /// provider id yet.
    pub async fn seed_identity(&self, record: IdentityRecord) {
        self.tables.write().await.identities.push(record);
    }

    /// Number of identity records, linked or not.
    pub async fn identity_count(&self) -> usize {
        self.tables.read().await.identities.len()
    }

    /// Records carrying `email`.
    pub async fn identities_with_email(&self, email: &str) -> Vec<IdentityRecord> {
        self.tables
            .read()
            .await
            .identities
            .iter()
            .filter(|r| r.email.as_deref() == Some(email))
            .cloned()
            .collect()
    }
}

fn refresh(record: &mut IdentityRecord, profile: &IdentityProfile, with_email: bool) {
    if with_email && let Some(email) = &profile.email {
        record.email = Some(email.clone());
    }
    if let Some(name) = &profile.name {
        record.discord_username = Some(name.clone());
    }
    if let Some(image) = &profile.image {
        record.discord_avatar = Some(image.clone());
    }
    record.last_updated = Utc::now();
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn upsert_identity(
        &self,
        provider_account_id: &str,
        profile: &IdentityProfile,
    ) -> Result<String, AuthError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .identities
            .iter_mut()
            .find(|r| r.discord_id.as_deref() == Some(provider_account_id))
        {
            refresh(existing, profile, true);
            return Ok(provider_account_id.to_string());
        }

        if let Some(email) = profile.email.as_deref()
            && let Some(unlinked) = tables
                .identities
                .iter_mut()
                .find(|r| r.discord_id.is_none() && r.email.as_deref() == Some(email))
        {
            unlinked.discord_id = Some(provider_account_id.to_string());
            refresh(unlinked, profile, false);
            return Ok(provider_account_id.to_string());
        }

        let now = Utc::now();
        tables.identities.push(IdentityRecord {
            discord_id: Some(provider_account_id.to_string()),
            email: profile.email.clone(),
            discord_username: profile.name.clone(),
            discord_avatar: profile.image.clone(),
            minecraft_name: None,
            account_type: DEFAULT_ACCOUNT_TYPE.to_string(),
            verified: false,
            linked_at: now,
            last_updated: now,
        });
        Ok(provider_account_id.to_string())
    }

    async fn find_identity(&self, discord_id: &str) -> Result<Option<IdentityRecord>, AuthError> {
        Ok(self
            .tables
            .read()
            .await
            .identities
            .iter()
            .find(|r| r.discord_id.as_deref() == Some(discord_id))
            .cloned())
    }

    async fn find_admin_grant(&self, discord_id: &str) -> Result<Option<AdminGrant>, AuthError> {
        Ok(self
            .tables
            .read()
            .await
            .grants
            .get(discord_id)
            .filter(|g| g.is_active)
            .cloned())
    }

    async fn touch_admin_last_login(&self, discord_id: &str) -> Result<(), AuthError> {
        if let Some(grant) = self.tables.write().await.grants.get_mut(discord_id) {
            grant.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_admin_grant(&self, grant: &GrantRequest) -> Result<(), AuthError> {
        let mut tables = self.tables.write().await;
        let last_login = tables
            .grants
            .get(&grant.discord_id)
            .and_then(|g| g.last_login);
        tables.grants.insert(
            grant.discord_id.clone(),
            AdminGrant {
                discord_id: grant.discord_id.clone(),
                discord_username: grant.discord_username.clone(),
                access_level: grant.access_level.clone(),
                granted_by: grant.granted_by.clone(),
                is_active: true,
                last_login,
            },
        );
        Ok(())
    }

    async fn revoke_admin_grant(
        &self,
        discord_id: &str,
        _revoked_by: Option<&str>,
    ) -> Result<bool, AuthError> {
        match self.tables.write().await.grants.get_mut(discord_id) {
            Some(grant) if grant.is_active => {
                grant.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_admin_user_by_email(&self, email: &str) -> Result<Option<AdminUser>, AuthError> {
        Ok(self
            .tables
            .read()
            .await
            .admins
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn create_admin_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<String, AuthError> {
        let mut tables = self.tables.write().await;
        if tables.admins.iter().any(|a| a.email == email) {
            return Err(AuthError::ValidationError(format!(
                "admin {email} already exists"
            )));
        }
        let id = (tables.admins.len() + 1).to_string();
        tables.admins.push(AdminUser {
            id: id.clone(),
            email: email.to_string(),
            name: name.map(str::to_string),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
        });
        Ok(id)
    }
}
