//! Connection and schema setup for the task database.
//!
//! `learnbuddy db-init` and the test databases go through
//! [`prepare_database`]: create the database on first use, connect, then
//! bring the `tasks` schema up to date with the embedded migrations.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/learnbuddy-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const POOL_SIZE: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// What [`prepare_database`] found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStatus {
    /// The database did not exist and was created.
    pub created: bool,
    /// Latest applied migration, `None` on an empty schema.
    pub schema_version: Option<i64>,
}

/// Connect to the task database.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(POOL_SIZE)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Create the database if needed, connect and migrate.
pub async fn prepare_database(config: &DbConfig) -> Result<(PgPool, DatabaseStatus)> {
    let created = ensure_database_exists(config).await?;
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    let schema_version = schema_version(&pool).await?;
    Ok((
        pool,
        DatabaseStatus {
            created,
            schema_version,
        },
    ))
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    debug!("task schema up to date");
    Ok(())
}

/// Latest successfully applied migration version.
pub async fn schema_version(pool: &PgPool) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .context("failed to read applied migrations")
}

/// The target database name, restricted to characters that are safe to
/// splice into `CREATE DATABASE` / `DROP DATABASE`.
pub fn checked_database_name(config: &DbConfig) -> Result<&str> {
    let Some(name) = config.database_name() else {
        bail!("no database name in {}", config.database_url);
    };
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("database name {name:?} contains invalid characters");
    }
    Ok(name)
}

async fn maintenance_pool(config: &DbConfig) -> Result<PgPool> {
    let url = config.maintenance_url();
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {url}"))
}

/// Create the target database when it is missing. Returns whether it was
/// created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let name = checked_database_name(config)?;
    let maint = maintenance_pool(config).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&maint)
            .await
            .context("failed to query pg_database")?;
    if !exists {
        maint
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .with_context(|| format!("failed to create database {name}"))?;
        info!(db = name, "created task database");
    }

    maint.close().await;
    Ok(!exists)
}

/// Drop the target database, disconnecting any remaining sessions first.
pub async fn drop_database(config: &DbConfig) -> Result<()> {
    let name = checked_database_name(config)?;
    let maint = maintenance_pool(config).await?;

    sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(name)
    .execute(&maint)
    .await
    .with_context(|| format!("failed to disconnect sessions from {name}"))?;
    maint
        .execute(format!("DROP DATABASE IF EXISTS {name}").as_str())
        .await
        .with_context(|| format!("failed to drop database {name}"))?;

    maint.close().await;
    Ok(())
}
