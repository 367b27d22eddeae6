//! In-memory [`RequestStore`] for tests and embedding without SQLite.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{CapturedRequest, NewCapturedRequest};

use super::RequestStore;

#[derive(Default)]
struct Table {
    rows: Vec<CapturedRequest>,
    next_id: i64,
}

/// Vec-backed store behind a `RwLock`.
#[derive(Default)]
pub struct InMemoryStore {
    table: RwLock<Table>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Constraint("in-memory table lock poisoned".to_string())
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn insert(&self, record: &NewCapturedRequest) -> Result<i64, StorageError> {
        let mut table = self.table.write().map_err(poisoned)?;
        table.next_id += 1;
        let id = table.next_id;
        table.rows.push(record.clone().with_id(id));
        Ok(id)
    }

    async fn mark_copied(&self, id: i64) -> Result<(), StorageError> {
        let mut table = self.table.write().map_err(poisoned)?;
        if let Some(row) = table.rows.iter_mut().find(|r| r.id == id) {
            row.is_copied = true;
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CapturedRequest>, StorageError> {
        let table = self.table.read().map_err(poisoned)?;
        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<CapturedRequest>, StorageError> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.rows.iter().find(|r| r.id == id).cloned())
    }
}
