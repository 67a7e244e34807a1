//! Error taxonomy for the JSON document store.
//!
//! Absence is never an error here: lookups return `Option` and removals
//! return `bool`, so callers branch on the value instead of the failure.

use std::path::PathBuf;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file does not have the documented shape. Loads keep
    /// failing until the file is repaired out of band.
    #[error("store file {path} is corrupt: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode store data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corruption { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("mutation queue worker has shut down")]
    Closed,
    #[error("queued task panicked")]
    Panicked,
}
