//! Maven auth center server binary.
//!
//! Serves the SSO, session and admin-link endpoints, or bootstraps a
//! credential admin with `create-admin`.

pub use self::error::{Error, Result};
mod error;

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use maven_api::config::ApiConfig;
use maven_core::auth::password::hash_password;
use maven_core::auth::session::admin_email;
use maven_core::identity::{IdentityStore, PgIdentityStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

const DEFAULT_LOG_FILTER: &str = "info,maven_api=debug,maven_core=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    let mut config = ApiConfig::from_env();
    config.pg_connection_url = args.database_url.clone();
    if let Some(bind) = args.bind.clone() {
        config.bind_addr = bind;
    }

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    maven_api::migrate(&pool).await?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, pool).await,
        Commands::CreateAdmin {
            username,
            password,
            name,
            role,
        } => create_admin(&config, pool, &username, &password, name.as_deref(), &role).await,
    }
}

async fn serve(config: ApiConfig, pool: PgPool) -> Result<()> {
    let bind_addr = config.bind_addr.clone();
    let store: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(pool));
    let state = maven_api::AppState::new(config, store);
    let cleanup = state.login_states.spawn_cleanup_task();

    let app = maven_api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "maven_server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    info!("maven_server stopped");
    Ok(())
}

async fn create_admin(
    config: &ApiConfig,
    pool: PgPool,
    username: &str,
    password: &str,
    name: Option<&str>,
    role: &str,
) -> Result<()> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(Error::Custom("username and password are required".into()));
    }
    let email = admin_email(username.trim(), &config.admin_email_domain);
    let hash = hash_password(password)?;
    let id = PgIdentityStore::new(pool)
        .create_admin_user(&email, name, &hash, role)
        .await?;
    info!(admin_id = %id, email = %email, role, "admin created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
