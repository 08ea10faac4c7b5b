use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::sink::{CloseCallback, SessionSink, SinkError};

/// A connected client session with a bounded outbound queue.
///
/// The socket writer drains the receiver returned by [`ClientSession::new`].
/// A session that cannot keep up is closed rather than allowed to stall the
/// bus.
pub struct ClientSession {
    id: Uuid,
    tx: mpsc::Sender<Value>,
    open: AtomicBool,
    close_callbacks: Mutex<Vec<CloseCallback>>,
}

impl ClientSession {
    pub fn new(queue_depth: usize) -> (Arc<Self>, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
            open: AtomicBool::new(true),
            close_callbacks: Mutex::new(Vec::new()),
        });
        (session, rx)
    }

    /// Mark the session closed and fire its close callbacks. Idempotent.
    pub fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(
            &mut *self
                .close_callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(session_id = %self.id, callbacks = callbacks.len(), "Session closed");
        for callback in callbacks {
            callback();
        }
    }

    /// A guard that closes the session when dropped, so a handler future
    /// cancelled mid-wait still releases its subscriptions.
    pub fn close_on_drop(self: &Arc<Self>) -> CloseGuard {
        CloseGuard(Arc::clone(self))
    }
}

pub struct CloseGuard(Arc<ClientSession>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl SessionSink for ClientSession {
    fn session_id(&self) -> Uuid {
        self.id
    }

    fn send_message(&self, message: Value) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %self.id, "Session queue full, closing session");
                self.close();
                Err(SinkError::Overflow)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(SinkError::Closed)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn on_close(&self, callback: CloseCallback) {
        let mut callbacks = self
            .close_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_open() {
            callbacks.push(callback);
            return;
        }
        drop(callbacks);
        callback();
    }
}
