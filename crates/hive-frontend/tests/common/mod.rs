//! Shared fixtures: a websocket backend shard and a fully wired frontend.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hive_core::Config;
use hive_core::auth::{InMemoryDeviceDirectory, Principal, Role, StaticTokenAuthenticator};
use hive_core::config::ReconnectPolicy;
use hive_core::model::Device;
use hive_core::time::SystemClock;
use hive_frontend::bus::BusRegistry;
use hive_frontend::server::{AppState, build_router};
use hive_frontend::transport::spawn_transports;
use hive_proto::{InboundFrame, OutboundFrame, ResponseBody};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(3);
pub const ADMIN_TOKEN: &str = "admin-token";
pub const CLIENT_TOKEN: &str = "client-token";

enum Control {
    Send(String),
    Disconnect,
}

/// A backend shard listening on a local websocket.
pub struct FakeBackend {
    pub endpoint: String,
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
    control: mpsc::UnboundedSender<Control>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/bus", listener.local_addr().unwrap());
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (control, mut control_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(socket) = accept_async(stream).await else {
                    continue;
                };
                let (mut sink, mut source) = socket.split();
                loop {
                    tokio::select! {
                        msg = source.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let frame: OutboundFrame = serde_json::from_str(text.as_str())
                                    .expect("frontend sent an undecodable frame");
                                let _ = frame_tx.send(frame);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        },
                        ctl = control_rx.recv() => match ctl {
                            Some(Control::Send(text)) => {
                                if sink.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Control::Disconnect) => {
                                let _ = sink.close().await;
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            endpoint,
            frames,
            control,
        }
    }

    /// Next frame the frontend sent. Panics if none arrives in time.
    pub async fn next_frame(&mut self) -> OutboundFrame {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("no frame within timeout")
            .expect("backend closed")
    }

    /// A frame arriving within `wait`, if any.
    pub async fn frame_within(&mut self, wait: Duration) -> Option<OutboundFrame> {
        tokio::time::timeout(wait, self.frames.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn reply(&self, correlation_id: Uuid, body: ResponseBody) {
        let text = serde_json::to_string(&InboundFrame {
            correlation_id,
            body,
        })
        .unwrap();
        self.send_raw(text);
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        self.control.send(Control::Send(text.into())).unwrap();
    }

    pub fn disconnect(&self) {
        self.control.send(Control::Disconnect).unwrap();
    }
}

pub fn devices() -> Vec<Device> {
    vec![
        Device {
            guid: "dev-1".into(),
            name: "Thermostat".into(),
            network_id: Some(1),
        },
        Device {
            guid: "dev-2".into(),
            name: "Lamp".into(),
            network_id: Some(1),
        },
        Device {
            guid: "dev-3".into(),
            name: "Door".into(),
            network_id: Some(1),
        },
        Device {
            guid: "orphan".into(),
            name: "Orphan".into(),
            network_id: None,
        },
    ]
}

/// A frontend wired to the given backend shards through the real transport.
pub struct Frontend {
    pub state: AppState,
    shutdown: watch::Sender<bool>,
}

impl Frontend {
    pub async fn start(backends: &[&FakeBackend], subscribe_timeout_secs: u64) -> Self {
        let mut config = Config::default();
        config.bus.endpoints = backends.iter().map(|b| b.endpoint.clone()).collect();
        config.bus.request_timeout_secs = 2;
        config.bus.subscribe_timeout_secs = subscribe_timeout_secs;
        config.bus.reconnect = ReconnectPolicy {
            initial_delay_ms: 50,
            max_delay_ms: 200,
            max_attempts: None,
        };
        config.server.max_wait_timeout_secs = 1;

        let registry = BusRegistry::new(backends.len());
        let (shutdown, shutdown_rx) = watch::channel(false);
        spawn_transports(&config.bus, &registry, &shutdown_rx);

        let mut auth = StaticTokenAuthenticator::default();
        auth.insert(ADMIN_TOKEN, Principal::admin());
        auth.insert(
            CLIENT_TOKEN,
            Principal {
                role: Role::Client,
                user: None,
                device_guids: Some(["dev-1".to_string()].into()),
                device: None,
            },
        );

        let state = AppState::new(
            &config,
            registry,
            Arc::new(auth),
            Arc::new(InMemoryDeviceDirectory::new(devices())),
            Arc::new(SystemClock),
        );
        let frontend = Self { state, shutdown };
        frontend.wait_connected(backends.len()).await;
        frontend
    }

    pub async fn wait_connected(&self, shards: usize) {
        for _ in 0..300 {
            if self.state.bus.connected_count().await == shards {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("shards never connected");
    }

    /// Index of the backend a device's traffic is routed to.
    pub fn shard_of(&self, guid: &str) -> usize {
        self.state.bus.shard_for(guid)
    }

    /// Serve the router on a local port and return its address.
    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let router = build_router(self.state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }
}

impl Drop for Frontend {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// A websocket client session against a served frontend.
pub struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(addr: &str, token: &str) -> Self {
        let url = format!("ws://{addr}/api/websocket?accessToken={token}");
        let (socket, _) = connect_async(url).await.unwrap();
        Self { socket }
    }

    pub async fn send(&mut self, request: Value) {
        self.socket
            .send(Message::Text(request.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON message from the server. Panics if none arrives in time.
    pub async fn next(&mut self) -> Value {
        self.within(WAIT).await.expect("no websocket message within timeout")
    }

    /// A JSON message arriving within `wait`, if any.
    pub async fn within(&mut self, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.socket.next()).await.ok()??;
            if let Message::Text(text) = msg.ok()? {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
        }
    }

    /// Skip event frames until the reply to `request_id` arrives.
    pub async fn reply_to(&mut self, request_id: i64) -> (Value, Vec<Value>) {
        let mut events = Vec::new();
        loop {
            let msg = self.next().await;
            if msg.get("status").is_some() && msg["requestId"] == request_id {
                return (msg, events);
            }
            events.push(msg);
        }
    }
}
