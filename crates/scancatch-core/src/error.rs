//! Error taxonomy for the capture pipeline.

use std::time::Duration;

use thiserror::Error;

/// Persistence failure.
///
/// The capture path logs these and still answers the client; the
/// post-copy flag update logs and swallows them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage constraint violated: {0}")]
    Constraint(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Backend(Box::new(err))
    }
}

/// A single clipboard write attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    /// Another owner holds the clipboard right now. Worth retrying.
    #[error("clipboard busy: {0}")]
    Busy(String),
    /// The clipboard cannot be used at all. Retrying will not help.
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    /// A background write did not finish within its bound.
    #[error("clipboard write timed out after {0:?}")]
    TimedOut(Duration),
}

impl ClipboardError {
    /// Transient failures move on to the next strategy; anything else
    /// abandons the chain.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClipboardError::Busy(_) | ClipboardError::TimedOut(_))
    }
}
