//! Database migrations.
//!
//! Embeds the SQL files under `maven_core/migrations/`.

use sqlx::PgPool;

/// Run all embedded migrations against the pool.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
