//! Error types for compwatch-gateway.

use thiserror::Error;

/// Failures talking to the device gateway.
///
/// Every variant degrades the affected call's result to "no data"; none of
/// them aborts a pass.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway unreachable, connection reset, or the call timed out.
    #[error("gateway unreachable: {0}")]
    Connectivity(String),

    /// Gateway answered with an explicit failure.
    #[error("gateway reported failure (code {code}): {message}")]
    Protocol { message: String, code: i64 },

    /// Gateway answered with a body that is not the expected envelope.
    #[error("malformed gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, GatewayError::Connectivity(_))
    }
}
