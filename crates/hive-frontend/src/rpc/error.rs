//! RPC client error types.

use hive_proto::Action;

/// Failures surfaced by the RPC bus client.
///
/// Cloneable so a transport drop can fail every waiter of a shard with the
/// same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("Bus not connected: {0}")]
    NotConnected(String),

    #[error("Failed to send on shard: {0}")]
    SendFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Response channel dropped: {0}")]
    ResponseDropped(String),

    #[error("Backend error {code}: {message}")]
    Backend { code: u16, message: String },

    #[error("Unexpected response action {0}")]
    UnexpectedResponse(Action),

    #[error("Reply stream overflowed: {0}")]
    StreamOverflow(String),
}

impl From<RpcError> for hive_core::Error {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Backend { code, message } => match code {
                400 => Self::InvalidRequest(message),
                403 => Self::Forbidden(message),
                404 => Self::NotFound(message),
                _ => Self::Transient(format!("Backend error {code}: {message}")),
            },
            RpcError::UnexpectedResponse(_) => Self::Internal(err.to_string()),
            other => Self::Transient(other.to_string()),
        }
    }
}
