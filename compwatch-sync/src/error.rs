//! Error types for compwatch-sync.

use std::path::PathBuf;

use thiserror::Error;

use compwatch_core::{CoreError, InventoryError};

/// Failures of the backing store (baselines and change history).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("backing store unreachable: {0}")]
    Unreachable(String),

    /// The store was reached but rejected the read or write.
    #[error("backing store rejected request: {0}")]
    Persistence(String),

    /// The store returned data that does not decode into records.
    #[error("backing store returned malformed data: {0}")]
    Decode(String),

    /// An I/O error in the file backend, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (file backend).
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that stop a sync pass before any machine is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The machine list could not be obtained; the pass is skipped.
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// A store operation outside the per-entity pipeline failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid domain configuration (tool range etc.).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// `--machine` named a machine that is not monitored.
    #[error("machine '{0}' not found among monitored machines")]
    MachineNotFound(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
