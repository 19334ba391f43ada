//! Error types for compwatch-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or validating domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// An entity code string was not `T<n>` or `P<n>` with a valid index.
    #[error("invalid entity code '{0}'; expected T<n> or P1..P48")]
    InvalidEntityCode(String),

    /// A field name did not match any tracked field.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// The configured tool range is empty or starts at zero.
    #[error("invalid tool range {start}..={end}")]
    InvalidToolRange { start: u16, end: u16 },
}

/// Errors raised while loading the machine list.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Underlying I/O failure reading the inventory file.
    #[error("I/O error reading inventory at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the offending path.
    #[error("failed to parse inventory at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The remote inventory could not be reached or returned an error.
    #[error("machine inventory unavailable: {0}")]
    Unavailable(String),
}
