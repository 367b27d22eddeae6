//! Storage abstraction for captured requests.
//!
//! The [`RequestStore`] trait is the single durable home of capture
//! records. The live feed is always seeded from it and never the other way
//! round. Implementations must be `Send + Sync` so the capture middleware
//! can share one store across listener tasks.

pub mod memory;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{CapturedRequest, NewCapturedRequest};

/// Append-only table of captured requests.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](RequestStore::insert) | Append a record, returning its new id |
/// | [`mark_copied`](RequestStore::mark_copied) | Set the copied flag on one record |
/// | [`recent`](RequestStore::recent) | Newest records first, bounded |
/// | [`get`](RequestStore::get) | Point lookup by id |
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Append a record. Ids are unique and strictly increasing.
    async fn insert(&self, record: &NewCapturedRequest) -> Result<i64, StorageError>;

    /// Set `is_copied` on the record with this id.
    ///
    /// Unknown ids are not an error, and repeated calls are harmless.
    async fn mark_copied(&self, id: i64) -> Result<(), StorageError>;

    /// Up to `limit` records, newest timestamp first (ties: newest id first).
    async fn recent(&self, limit: usize) -> Result<Vec<CapturedRequest>, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<CapturedRequest>, StorageError>;
}
