//! A live connection to one backend shard and its correlation tables.

use std::collections::HashMap;

use hive_proto::{InboundFrame, OutboundFrame, ResponseBody};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::rpc::RpcError;

/// One reply delivered to a waiter: the decoded body, or the failure that
/// ended the correlation.
pub type ReplyItem = Result<ResponseBody, RpcError>;

/// Holds an active connection to a backend shard.
pub struct ShardConnection {
    /// Index of the shard in the configured endpoint list.
    pub shard: usize,
    pub endpoint: String,
    /// Sender for pushing frames to the transport task.
    frame_tx: mpsc::Sender<OutboundFrame>,
    /// Single-reply waiters keyed by correlation id.
    pending: RwLock<HashMap<Uuid, oneshot::Sender<ReplyItem>>>,
    /// Streaming correlations keyed by correlation id.
    streams: RwLock<HashMap<Uuid, mpsc::Sender<ReplyItem>>>,
}

impl ShardConnection {
    pub fn new(
        shard: usize,
        endpoint: impl Into<String>,
        frame_tx: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            shard,
            endpoint: endpoint.into(),
            frame_tx,
            pending: RwLock::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Queue a frame for the shard, waiting for room in the outbound buffer.
    pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), RpcError> {
        self.frame_tx
            .send(frame)
            .await
            .map_err(|_| RpcError::SendFailed(format!("shard {}", self.shard)))
    }

    /// Queue a frame without waiting. Fails if the outbound buffer is full.
    pub fn try_send_frame(&self, frame: OutboundFrame) -> Result<(), RpcError> {
        self.frame_tx
            .try_send(frame)
            .map_err(|_| RpcError::SendFailed(format!("shard {}", self.shard)))
    }

    pub fn is_closed(&self) -> bool {
        self.frame_tx.is_closed()
    }

    /// Register a single-reply waiter and return its receiver.
    pub async fn register_pending(&self, correlation_id: Uuid) -> oneshot::Receiver<ReplyItem> {
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(correlation_id, tx);
        rx
    }

    pub async fn remove_pending(&self, correlation_id: &Uuid) -> bool {
        self.pending.write().await.remove(correlation_id).is_some()
    }

    /// Register a streaming correlation buffering up to `buffer` replies.
    pub async fn register_stream(
        &self,
        correlation_id: Uuid,
        buffer: usize,
    ) -> mpsc::Receiver<ReplyItem> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.streams.write().await.insert(correlation_id, tx);
        rx
    }

    pub async fn remove_stream(&self, correlation_id: &Uuid) -> bool {
        self.streams.write().await.remove(correlation_id).is_some()
    }

    /// Route an inbound frame to the waiter or stream owning its correlation.
    ///
    /// Returns `false` when nobody is waiting for it any more.
    pub async fn dispatch(&self, frame: InboundFrame) -> bool {
        let InboundFrame {
            correlation_id,
            body,
        } = frame;
        let item = match body {
            ResponseBody::ErrorResponse(e) => Err(RpcError::Backend {
                code: e.code,
                message: e.message,
            }),
            body => Ok(body),
        };

        if let Some(tx) = self.pending.write().await.remove(&correlation_id) {
            return tx.send(item).is_ok();
        }

        let mut streams = self.streams.write().await;
        let Some(tx) = streams.get(&correlation_id) else {
            debug!(
                shard = self.shard,
                correlation_id = %correlation_id,
                "Dropping reply for unknown correlation"
            );
            return false;
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    shard = self.shard,
                    correlation_id = %correlation_id,
                    "Reply stream full, closing it"
                );
                // The consumer sees the overflow once it drains a slot
                if let Some(tx) = streams.remove(&correlation_id) {
                    let err = RpcError::StreamOverflow(format!("shard {}", self.shard));
                    tokio::spawn(async move {
                        let _ = tx.send(Err(err)).await;
                    });
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                streams.remove(&correlation_id);
                false
            }
        }
    }

    /// Fail a single-reply waiter whose reply could not be decoded.
    ///
    /// Streams are left alone: an unreadable event is skipped, not fatal.
    pub async fn reject(&self, correlation_id: &Uuid, err: RpcError) -> bool {
        match self.pending.write().await.remove(correlation_id) {
            Some(tx) => tx.send(Err(err)).is_ok(),
            None => false,
        }
    }

    /// Complete every pending waiter and stream with `err`.
    pub async fn fail_all(&self, err: &RpcError) -> usize {
        let pending: Vec<_> = self.pending.write().await.drain().collect();
        let streams: Vec<_> = self.streams.write().await.drain().collect();
        let count = pending.len() + streams.len();
        for (_, tx) in pending {
            let _ = tx.send(Err(err.clone()));
        }
        for (_, tx) in streams {
            let _ = tx.try_send(Err(err.clone()));
        }
        if count > 0 {
            warn!(shard = self.shard, count, error = %err, "Failed in-flight correlations");
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}
