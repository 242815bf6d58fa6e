//! Database initialization
//!
//! Opens (or creates) the Drover SQLite database and applies the schema.
//! All `create_*_table` functions are idempotent and public so tests can
//! build in-memory databases from the same definitions.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode: concurrent readers while the migration holds its write txn
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Apply the full schema (idempotent, safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_canonical_addresses_table(pool).await?;
    create_orders_table(pool).await?;
    Ok(())
}

/// Legacy order records awaiting address normalization
///
/// `canonical_address_guid`, `address_country`, `address_snapshot` and
/// `address_status` are written by the migration engine; everything else is
/// owned by the ordering application and read-only here.
pub async fn create_orders_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            guid TEXT PRIMARY KEY,
            tenant_guid TEXT NOT NULL,
            raw_address TEXT,
            canonical_address_guid TEXT REFERENCES canonical_addresses(guid),
            address_country TEXT,
            address_snapshot TEXT,
            address_status TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_unlinked
         ON orders (tenant_guid) WHERE canonical_address_guid IS NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Deduplicated canonical address catalog
///
/// The UNIQUE index over (tenant_guid, country_code, content_hash) is the
/// deduplication key; insert-if-absent relies on it for conflict resolution.
pub async fn create_canonical_addresses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS canonical_addresses (
            guid TEXT PRIMARY KEY,
            tenant_guid TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            country_code TEXT NOT NULL,
            street TEXT NOT NULL,
            house_number TEXT NOT NULL,
            city TEXT NOT NULL,
            postal_code TEXT NOT NULL,
            formatted TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            validation_status TEXT NOT NULL,
            last_validated_at TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_canonical_addresses_dedup
         ON canonical_addresses (tenant_guid, country_code, content_hash)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
