//! Shard transport error types.

/// Errors that end one connection attempt to a shard.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Websocket error: {0}")]
    Websocket(String),

    #[error("Connection closed by shard")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Websocket(err.to_string())
    }
}
