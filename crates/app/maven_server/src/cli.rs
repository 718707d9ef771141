use clap::{Parser, Subcommand};

/// Maven auth center.
#[derive(Parser, Debug)]
#[command(name = "maven_server", version, about = "Maven auth center server")]
pub struct Cli {
    /// Address to listen on; overrides `BIND_ADDR`.
    #[arg(long)]
    pub bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/maven"
    )]
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    pub max_connections: u32,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default).
    Serve,

    /// Create a credential admin and exit.
    CreateAdmin {
        /// Login name; `@<ADMIN_EMAIL_DOMAIN>` is appended unless it is an email.
        #[arg(long)]
        username: String,

        #[arg(long, env = "MAVEN_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "admin")]
        role: String,
    },
}
