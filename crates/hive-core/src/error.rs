//! Error types for the frontend core.

use thiserror::Error;

/// Result type alias using the frontend [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the frontend.
///
/// The first six variants are the request-level kinds callers see; the rest
/// only occur while the process starts up.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or contradictory request parameters.
    #[error("Invalid request parameters: {0}")]
    InvalidRequest(String),

    /// Entity lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Principal lacks access, or the device is not bound to a network.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity failed validation after wrapper fields were applied.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Bus timeout, disconnect, serialization or backend-reported failure.
    #[error("Backend unavailable: {0}")]
    Transient(String),

    /// Unexpected reply from the backend.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code reported to clients for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::ValidationFailed(_) | Self::Json(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Transient(_) => 503,
            Self::Internal(_) | Self::Config(_) | Self::Io(_) => 500,
        }
    }

    /// Stable machine-readable code used in error frames.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Json(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Transient(_) => "transient",
            Self::Internal(_) | Self::Config(_) | Self::Io(_) => "internal",
        }
    }
}
