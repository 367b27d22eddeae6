//! SQLite-backed [`RequestStore`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use scancatch_core::models::{CapturedRequest, NewCapturedRequest};
use scancatch_core::store::RequestStore;
use scancatch_core::StorageError;

/// SQLite implementation of [`RequestStore`] over the `http_requests` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn storage_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.kind() != sqlx::error::ErrorKind::Other => {
            StorageError::Constraint(db_err.message().to_string())
        }
        _ => StorageError::backend(err),
    }
}

fn from_millis(ms: i64) -> DateTime<Local> {
    DateTime::from_timestamp_millis(ms)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now)
}

fn row_to_request(row: &SqliteRow) -> CapturedRequest {
    let timestamp: i64 = row.get("timestamp");
    let is_copied: i64 = row.get("is_copied");
    CapturedRequest {
        id: row.get("id"),
        method: row.get("method"),
        path: row.get("path"),
        headers: row.get("headers"),
        body: row.get("body"),
        timestamp: from_millis(timestamp),
        client_ip: row.get("client_ip"),
        is_copied: is_copied != 0,
        kind: row.get("type"),
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, method, path, headers, body, timestamp, client_ip, is_copied, type FROM http_requests";

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert(&self, record: &NewCapturedRequest) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO http_requests (method, path, headers, body, timestamp, client_ip, is_copied, type)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&record.method)
        .bind(&record.path)
        .bind(&record.headers)
        .bind(&record.body)
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.client_ip)
        .bind(&record.kind)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn mark_copied(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE http_requests SET is_copied = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CapturedRequest>, StorageError> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.iter().map(row_to_request).collect())
    }

    async fn get(&self, id: i64) -> Result<Option<CapturedRequest>, StorageError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.as_ref().map(row_to_request))
    }
}
