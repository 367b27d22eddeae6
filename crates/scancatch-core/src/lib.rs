//! # scancatch core
//!
//! Runtime-free logic shared by the scancatch listener and CLI: the
//! captured-request model, request normalization, the store abstraction,
//! the delivery error taxonomy, and the clipboard backoff policy.
//!
//! This crate contains no tokio, sqlx, HTTP, or OS clipboard dependencies.

pub mod backoff;
pub mod error;
pub mod models;
pub mod normalize;
pub mod store;

pub use error::{ClipboardError, StorageError};
pub use models::{CapturedRequest, NewCapturedRequest};
