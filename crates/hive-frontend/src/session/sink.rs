use serde_json::Value;
use uuid::Uuid;

/// Callback fired once when a session closes.
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Session closed")]
    Closed,

    #[error("Session outbound queue overflowed")]
    Overflow,
}

/// Capability to deliver messages to one connected client.
///
/// Subscriptions hold a sink without owning the session behind it.
pub trait SessionSink: Send + Sync {
    fn session_id(&self) -> Uuid;

    /// Queue a message without blocking the caller.
    fn send_message(&self, message: Value) -> Result<(), SinkError>;

    fn is_open(&self) -> bool;

    /// Run `callback` when the session closes, or right away if it already has.
    fn on_close(&self, callback: CloseCallback);
}
