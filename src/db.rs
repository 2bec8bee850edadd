//! Database pool setup and migrations.

use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// The main database connection pool.
pub type Db = sqlx::SqlitePool;

/// Embedded schema migrations, applied on startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open (creating if necessary) the database and apply pending migrations.
pub async fn establish_pool(url: &str) -> anyhow::Result<Db> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url {url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(opts)
        .await
        .context("failed to open database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    Ok(pool)
}
