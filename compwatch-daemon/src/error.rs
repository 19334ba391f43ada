use thiserror::Error;

use compwatch_core::CoreError;
use compwatch_sync::StoreError;

/// Error surface for configuration and the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The backing store failed its startup check. Fatal.
    #[error("backing store {location} unreachable at startup: {source}")]
    StoreUnreachable {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("ctrl-c handler failed: {0}")]
    Signal(#[source] std::io::Error),
}

pub(crate) fn config_err(message: impl Into<String>) -> DaemonError {
    DaemonError::Config(message.into())
}
