//! Postgres-backed persistence: users, sessions, messages, the outbox
//! relay queue, and per-user inbox delta-sync rows.

pub mod error;
pub mod inbox;
pub mod messages;
pub mod models;
pub mod outbox;
pub mod sessions;
pub mod users;

pub use error::{Error, Result};

use sqlx::postgres::{PgPoolOptions, PgPool};

pub async fn connect(dsn: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(dsn)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
