//! PostgreSQL-backed identity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::IdentityStore;
use crate::auth::AuthError;
use crate::models::auth::{
    AdminGrant, AdminUser, DEFAULT_ACCOUNT_TYPE, GrantRequest, IdentityProfile, IdentityRecord,
};

type IdentityRow = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

type GrantRow = (
    String,
    Option<String>,
    String,
    Option<String>,
    bool,
    Option<DateTime<Utc>>,
);

/// Identity store over the `player_accounts`, `admin_access` and
/// `store_admin_users` tables.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Refresh an existing record. Returns whether one was found.
    async fn update_existing(
        &self,
        discord_id: &str,
        profile: &IdentityProfile,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE player_accounts \
             SET email = COALESCE($2, email), \
                 discord_username = COALESCE($3, discord_username), \
                 discord_avatar = COALESCE($4, discord_avatar), \
                 last_updated = now() \
             WHERE discord_id = $1",
        )
        .bind(discord_id)
        .bind(profile.email.as_deref())
        .bind(profile.name.as_deref())
        .bind(profile.image.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach the provider id to an unlinked record with the same email.
    async fn attach_by_email(
        &self,
        discord_id: &str,
        email: &str,
        profile: &IdentityProfile,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE player_accounts \
             SET discord_id = $1, \
                 discord_username = COALESCE($3, discord_username), \
                 discord_avatar = COALESCE($4, discord_avatar), \
                 last_updated = now() \
             WHERE id = ( \
                 SELECT id FROM player_accounts \
                 WHERE email = $2 AND discord_id IS NULL \
                 ORDER BY id LIMIT 1 \
             )",
        )
        .bind(discord_id)
        .bind(email)
        .bind(profile.name.as_deref())
        .bind(profile.image.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_identity(
        &self,
        discord_id: &str,
        profile: &IdentityProfile,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO player_accounts \
               (discord_id, email, discord_username, discord_avatar, account_type, verified, linked_at, last_updated) \
             VALUES ($1, $2, $3, $4, $5, FALSE, now(), now())",
        )
        .bind(discord_id)
        .bind(profile.email.as_deref())
        .bind(profile.name.as_deref())
        .bind(profile.image.as_deref())
        .bind(DEFAULT_ACCOUNT_TYPE)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A concurrent writer already holds this provider id.
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn upsert_identity(
        &self,
        provider_account_id: &str,
        profile: &IdentityProfile,
    ) -> Result<String, AuthError> {
        if self.update_existing(provider_account_id, profile).await? {
            return Ok(provider_account_id.to_string());
        }

        if let Some(email) = profile.email.as_deref() {
            match self.attach_by_email(provider_account_id, email, profile).await {
                Ok(true) => {
                    debug!(discord_id = provider_account_id, "attached provider id by email");
                    return Ok(provider_account_id.to_string());
                }
                Ok(false) => {}
                Err(e) if is_unique_violation(&e) => {
                    self.update_existing(provider_account_id, profile).await?;
                    return Ok(provider_account_id.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        match self.insert_identity(provider_account_id, profile).await {
            Ok(()) => Ok(provider_account_id.to_string()),
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    discord_id = provider_account_id,
                    "concurrent identity insert, falling back to update"
                );
                self.update_existing(provider_account_id, profile).await?;
                Ok(provider_account_id.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_identity(&self, discord_id: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT discord_id, email, discord_username, discord_avatar, minecraft_name, \
                    account_type, verified, linked_at, last_updated \
             FROM player_accounts WHERE discord_id = $1",
        )
        .bind(discord_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(discord_id, email, discord_username, discord_avatar, minecraft_name, account_type, verified, linked_at, last_updated)| {
                IdentityRecord {
                    discord_id,
                    email,
                    discord_username,
                    discord_avatar,
                    minecraft_name,
                    account_type,
                    verified,
                    linked_at,
                    last_updated,
                }
            },
        ))
    }

    async fn find_admin_grant(&self, discord_id: &str) -> Result<Option<AdminGrant>, AuthError> {
        let row = sqlx::query_as::<_, GrantRow>(
            "SELECT discord_id, discord_username, access_level, granted_by, is_active, last_login \
             FROM admin_access WHERE discord_id = $1 AND is_active",
        )
        .bind(discord_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(discord_id, discord_username, access_level, granted_by, is_active, last_login)| {
                AdminGrant {
                    discord_id,
                    discord_username,
                    access_level,
                    granted_by,
                    is_active,
                    last_login,
                }
            },
        ))
    }

    async fn touch_admin_last_login(&self, discord_id: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE admin_access SET last_login = now() WHERE discord_id = $1")
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_admin_grant(&self, grant: &GrantRequest) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO admin_access (discord_id, discord_username, access_level, granted_by, is_active) \
             VALUES ($1, $2, $3, $4, TRUE) \
             ON CONFLICT (discord_id) DO UPDATE SET \
               is_active = TRUE, \
               access_level = EXCLUDED.access_level, \
               discord_username = EXCLUDED.discord_username, \
               granted_by = EXCLUDED.granted_by, \
               granted_at = now(), \
               revoked_at = NULL, \
               revoked_by = NULL",
        )
        .bind(&grant.discord_id)
        .bind(grant.discord_username.as_deref())
        .bind(&grant.access_level)
        .bind(grant.granted_by.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_admin_grant(
        &self,
        discord_id: &str,
        revoked_by: Option<&str>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE admin_access \
             SET is_active = FALSE, revoked_at = now(), revoked_by = $2 \
             WHERE discord_id = $1 AND is_active",
        )
        .bind(discord_id)
        .bind(revoked_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_admin_user_by_email(&self, email: &str) -> Result<Option<AdminUser>, AuthError> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
            "SELECT id::text, email, name, password_hash, role \
             FROM store_admin_users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, email, name, password_hash, role)| AdminUser {
            id,
            email,
            name,
            password_hash,
            role,
        }))
    }

    async fn create_admin_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<String, AuthError> {
        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO store_admin_users (email, name, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING id::text",
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::ValidationError(format!("admin {email} already exists"))
            } else {
                AuthError::DbError(e)
            }
        })?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connects only when `TEST_DATABASE_URL` points at a disposable database.
    async fn test_store() -> Option<PgIdentityStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to test database");
        crate::migrate::migrate(&pool).await.expect("migrate");
        Some(PgIdentityStore::new(pool))
    }

    fn unique_id(tag: &str) -> String {
        format!("{tag}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let Some(store) = test_store().await else {
            return;
        };
        let id = unique_id("pg-idem");
        let profile = IdentityProfile {
            email: Some(format!("{id}@example.com")),
            name: Some("Foo".into()),
            image: None,
        };
        store.upsert_identity(&id, &profile).await.unwrap();
        store.upsert_identity(&id, &profile).await.unwrap();

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM player_accounts WHERE discord_id = $1",
        )
        .bind(&id)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let record = store.find_identity(&id).await.unwrap().unwrap();
        assert_eq!(record.discord_username.as_deref(), Some("Foo"));
        assert_eq!(record.account_type, DEFAULT_ACCOUNT_TYPE);
        assert!(!record.verified);
    }

    #[tokio::test]
    async fn email_merge_attaches_provider_id() {
        let Some(store) = test_store().await else {
            return;
        };
        let id = unique_id("pg-merge");
        let email = format!("{id}@example.com");
        sqlx::query("INSERT INTO player_accounts (email, minecraft_name) VALUES ($1, 'Steve')")
            .bind(&email)
            .execute(&store.pool)
            .await
            .unwrap();

        let profile = IdentityProfile {
            email: Some(email.clone()),
            name: Some("Foo".into()),
            image: None,
        };
        store.upsert_identity(&id, &profile).await.unwrap();

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM player_accounts WHERE email = $1")
            .bind(&email)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let record = store.find_identity(&id).await.unwrap().unwrap();
        assert_eq!(record.minecraft_name.as_deref(), Some("Steve"));
    }

    #[tokio::test]
    async fn grant_lifecycle() {
        let Some(store) = test_store().await else {
            return;
        };
        let id = unique_id("pg-grant");
        assert!(store.find_admin_grant(&id).await.unwrap().is_none());

        store
            .upsert_admin_grant(&GrantRequest {
                discord_id: id.clone(),
                discord_username: Some("Foo".into()),
                access_level: "admin".into(),
                granted_by: Some("1".into()),
            })
            .await
            .unwrap();
        store.touch_admin_last_login(&id).await.unwrap();
        let grant = store.find_admin_grant(&id).await.unwrap().unwrap();
        assert!(grant.last_login.is_some());

        assert!(store.revoke_admin_grant(&id, Some("1")).await.unwrap());
        assert!(store.find_admin_grant(&id).await.unwrap().is_none());
    }
}
