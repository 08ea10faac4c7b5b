use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use uuid::Uuid;

use super::sink::{CloseCallback, SessionSink, SinkError};

/// A sink that queues messages until [`HeldSink::release`], then forwards
/// them to the session it wraps.
///
/// A subscribe request hands this to the subscription so backlog and early
/// events reach the client after the reply that names the subscription.
pub struct HeldSink {
    inner: Arc<dyn SessionSink>,
    held: Mutex<Option<Vec<Value>>>,
}

impl HeldSink {
    pub fn new(inner: Arc<dyn SessionSink>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            held: Mutex::new(Some(Vec::new())),
        })
    }

    /// Flush everything queued so far and pass later messages straight
    /// through. Idempotent.
    pub fn release(&self) -> Result<(), SinkError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queued) = held.take() else {
            return Ok(());
        };
        // Still locked, so a concurrent send cannot overtake the backlog
        queued
            .into_iter()
            .try_for_each(|message| self.inner.send_message(message))
    }
}

impl SessionSink for HeldSink {
    fn session_id(&self) -> Uuid {
        self.inner.session_id()
    }

    fn send_message(&self, message: Value) -> Result<(), SinkError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.as_mut() {
            Some(queued) => {
                if !self.inner.is_open() {
                    return Err(SinkError::Closed);
                }
                queued.push(message);
                Ok(())
            }
            None => self.inner.send_message(message),
        }
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn on_close(&self, callback: CloseCallback) {
        self.inner.on_close(callback);
    }
}
