//! Websocket transport to one backend shard, with automatic reconnection.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use hive_core::config::{BusConfig, ReconnectPolicy};
use hive_proto::{FrameError, InboundFrame, OutboundFrame};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::error::TransportError;
use crate::bus::{BusRegistry, ShardConnection};
use crate::rpc::RpcError;

/// A connection that stayed up this long resets the backoff.
const STABLE_CONNECTION: Duration = Duration::from_secs(60);

/// Maintains the websocket to one shard and registers it on the bus.
pub struct ShardTransport {
    shard: usize,
    endpoint: String,
    registry: BusRegistry,
    outbound_buffer: usize,
    keepalive: Duration,
    reconnect: ReconnectPolicy,
}

impl ShardTransport {
    pub fn new(shard: usize, endpoint: String, registry: BusRegistry, config: &BusConfig) -> Self {
        Self {
            shard,
            endpoint,
            registry,
            outbound_buffer: config.outbound_buffer.max(1),
            keepalive: Duration::from_secs(config.keepalive_secs.max(1)),
            reconnect: config.reconnect.clone(),
        }
    }

    /// Run until shutdown, reconnecting with exponential backoff.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!(shard = self.shard, "Shard transport shutting down");
                return;
            }

            let started = Instant::now();
            let result = self.connect_and_run(&mut shutdown).await;
            if *shutdown.borrow() {
                info!(shard = self.shard, "Shard transport shutting down");
                return;
            }
            if started.elapsed() > STABLE_CONNECTION {
                attempt = 0;
            }

            if !self.reconnect.should_retry(attempt) {
                error!(shard = self.shard, attempt, "Max reconnect attempts reached");
                return;
            }
            let delay = self.reconnect.delay_for_attempt(attempt);
            match result {
                Ok(()) => warn!(shard = self.shard, delay_ms = delay.as_millis(), "Shard closed, reconnecting"),
                Err(e) => warn!(
                    shard = self.shard,
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Reconnecting"
                ),
            }

            tokio::select! {
                () = sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!(shard = self.shard, "Shard transport shutting down during reconnect wait");
                    return;
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn connect_and_run(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let (socket, _) = connect_async(self.endpoint.as_str()).await?;
        info!(shard = self.shard, endpoint = %self.endpoint, "Connected to shard");

        let (frame_tx, frame_rx) = mpsc::channel(self.outbound_buffer);
        let conn = self
            .registry
            .register(self.shard, &self.endpoint, frame_tx)
            .await;

        let result = self.pump(&conn, socket, frame_rx, shutdown).await;

        self.registry.unregister(&conn).await;
        conn.fail_all(&RpcError::NotConnected(format!(
            "shard {} disconnected",
            self.shard
        )))
        .await;
        result
    }

    async fn pump<S>(
        &self,
        conn: &ShardConnection,
        socket: S,
        mut frame_rx: mpsc::Receiver<OutboundFrame>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut source) = socket.split();
        let mut keepalive = tokio::time::interval(self.keepalive);
        keepalive.tick().await;

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { return Ok(()) };
                    match frame.encode() {
                        Ok(text) => sink.send(Message::Text(text.into())).await?,
                        Err(e) => {
                            warn!(shard = self.shard, error = %e, "Dropping unencodable frame");
                            conn.reject(
                                &frame.correlation_id,
                                RpcError::SendFailed(e.to_string()),
                            )
                            .await;
                        }
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => handle_inbound(conn, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = keepalive.tick() => {
                    sink.send(Message::Ping(Vec::new().into())).await?;
                }
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Decode one text frame from a shard and route it to its waiter.
pub async fn handle_inbound(conn: &ShardConnection, text: &str) {
    match InboundFrame::decode(text) {
        Ok(frame) => {
            let correlation_id = frame.correlation_id;
            let action = frame.body.action();
            if !conn.dispatch(frame).await {
                debug!(shard = conn.shard, correlation_id = %correlation_id, %action, "Reply had no waiter");
            }
        }
        Err(FrameError::UnknownAction {
            correlation_id,
            action,
        }) => {
            warn!(
                shard = conn.shard,
                correlation_id = %correlation_id,
                action = %action,
                "Ignoring reply with unknown action"
            );
            conn.reject(
                &correlation_id,
                RpcError::ResponseDropped(format!("unknown action {action}")),
            )
            .await;
        }
        Err(e) => {
            warn!(shard = conn.shard, error = %e, "Ignoring malformed frame");
        }
    }
}
