use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hive_proto::{OutboundFrame, ReplyMode, ResponseBody};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::Stream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RpcError, RpcRequest};
use crate::bus::{BusRegistry, ReplyItem, ShardConnection};

/// Issues requests on the bus and correlates their replies.
#[derive(Clone)]
pub struct RpcClient {
    registry: BusRegistry,
    request_timeout: Duration,
    stream_buffer: usize,
}

impl RpcClient {
    pub const fn new(registry: BusRegistry, request_timeout: Duration, stream_buffer: usize) -> Self {
        Self {
            registry,
            request_timeout,
            stream_buffer,
        }
    }

    pub const fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    /// Send a request and wait for its single reply.
    ///
    /// A backend `ERROR_RESPONSE` comes back as [`RpcError::Backend`].
    pub async fn call(&self, request: RpcRequest) -> Result<ResponseBody, RpcError> {
        let RpcRequest {
            body,
            partition_key,
            ..
        } = request;
        let conn = self.registry.route(partition_key.as_deref()).await?;
        let correlation_id = Uuid::new_v4();
        let action = body.action();

        // Register the waiter before sending so a fast reply is not lost
        let response_rx = conn.register_pending(correlation_id).await;

        let frame = OutboundFrame {
            correlation_id,
            partition_key,
            reply: ReplyMode::Single,
            body,
        };
        if let Err(e) = conn.send_frame(frame).await {
            conn.remove_pending(&correlation_id).await;
            return Err(e);
        }
        debug!(shard = conn.shard, correlation_id = %correlation_id, %action, "Request sent");

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(RpcError::ResponseDropped(format!(
                "{action} on shard {}",
                conn.shard
            ))),
            Err(_) => {
                conn.remove_pending(&correlation_id).await;
                warn!(
                    shard = conn.shard,
                    correlation_id = %correlation_id,
                    %action,
                    "Request timed out"
                );
                Err(RpcError::Timeout(format!("{action} on shard {}", conn.shard)))
            }
        }
    }

    /// Send a request whose correlation stays open for a stream of replies.
    pub async fn call_stream(&self, request: RpcRequest) -> Result<ReplyStream, RpcError> {
        let RpcRequest {
            body,
            partition_key,
            ..
        } = request;
        let conn = self.registry.route(partition_key.as_deref()).await?;
        let correlation_id = Uuid::new_v4();
        let action = body.action();

        let rx = conn
            .register_stream(correlation_id, self.stream_buffer)
            .await;

        let frame = OutboundFrame {
            correlation_id,
            partition_key,
            reply: ReplyMode::Stream,
            body,
        };
        if let Err(e) = conn.send_frame(frame).await {
            conn.remove_stream(&correlation_id).await;
            return Err(e);
        }
        debug!(shard = conn.shard, correlation_id = %correlation_id, %action, "Stream opened");

        Ok(ReplyStream {
            handle: StreamHandle {
                correlation_id,
                conn,
            },
            rx,
        })
    }

    /// Fire-and-forget send. Nothing waits for a reply.
    pub async fn push(&self, request: RpcRequest) -> Result<(), RpcError> {
        let RpcRequest {
            body,
            partition_key,
            ..
        } = request;
        let conn = self.registry.route(partition_key.as_deref()).await?;
        let action = body.action();
        let frame = OutboundFrame {
            correlation_id: Uuid::new_v4(),
            partition_key,
            reply: ReplyMode::None,
            body,
        };
        conn.try_send_frame(frame).inspect_err(|e| {
            warn!(shard = conn.shard, %action, error = %e, "Push dropped");
        })
    }
}

/// The shard-side identity of an open stream, kept to release it later.
#[derive(Clone)]
pub struct StreamHandle {
    correlation_id: Uuid,
    conn: Arc<ShardConnection>,
}

impl StreamHandle {
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn shard(&self) -> usize {
        self.conn.shard
    }

    /// Stop routing replies to this stream. Idempotent.
    pub async fn release(&self) {
        self.conn.remove_stream(&self.correlation_id).await;
    }
}

/// Replies arriving on an open streaming correlation.
pub struct ReplyStream {
    handle: StreamHandle,
    rx: mpsc::Receiver<ReplyItem>,
}

impl ReplyStream {
    pub const fn correlation_id(&self) -> Uuid {
        self.handle.correlation_id
    }

    pub const fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub async fn recv(&mut self) -> Option<ReplyItem> {
        self.rx.recv().await
    }
}

impl Stream for ReplyStream {
    type Item = ReplyItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
