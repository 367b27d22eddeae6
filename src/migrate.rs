use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema if missing. Safe to run against an existing database.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    pool.close().await;
    Ok(())
}

/// Apply migrations on an already-open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Timestamps are unix milliseconds; length caps mirror scancatch_core::models.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS http_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            method TEXT NOT NULL CHECK (length(method) <= 10),
            path TEXT NOT NULL CHECK (length(path) <= 500),
            headers TEXT NOT NULL DEFAULT '' CHECK (length(headers) <= 4000),
            body TEXT NOT NULL DEFAULT '' CHECK (length(body) <= 10000),
            timestamp INTEGER NOT NULL,
            client_ip TEXT NOT NULL DEFAULT 'Unknown' CHECK (length(client_ip) <= 45),
            is_copied INTEGER NOT NULL DEFAULT 0,
            type TEXT NOT NULL DEFAULT '' CHECK (length(type) <= 100)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before the copied flag existed lack the column.
    let has_is_copied: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('http_requests') WHERE name = 'is_copied'",
    )
    .fetch_one(pool)
    .await?;

    if !has_is_copied {
        sqlx::query("ALTER TABLE http_requests ADD COLUMN is_copied INTEGER NOT NULL DEFAULT 0")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_http_requests_timestamp ON http_requests(timestamp DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
