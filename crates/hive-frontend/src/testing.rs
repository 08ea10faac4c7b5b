//! In-process stand-in for a backend shard, for unit tests.

#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use hive_core::Config;
use hive_core::auth::{InMemoryDeviceDirectory, Principal, Role, StaticTokenAuthenticator};
use hive_core::model::Device;
use hive_core::time::SystemClock;
use hive_proto::{InboundFrame, OutboundFrame, ResponseBody};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::{BusRegistry, ShardConnection};
use crate::rpc::RpcClient;
use crate::server::AppState;

const WAIT: Duration = Duration::from_secs(2);

pub struct FakeShard {
    pub conn: Arc<ShardConnection>,
    frames: mpsc::Receiver<OutboundFrame>,
}

impl FakeShard {
    pub async fn connect(registry: &BusRegistry, shard: usize) -> Self {
        let (tx, frames) = mpsc::channel(64);
        let conn = registry.register(shard, "ws://fake", tx).await;
        Self { conn, frames }
    }

    /// Next frame the frontend sent. Panics if none arrives in time.
    pub async fn next_frame(&mut self) -> OutboundFrame {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("no frame within timeout")
            .expect("frame channel closed")
    }

    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.try_recv().ok()
    }

    pub async fn reply(&self, correlation_id: Uuid, body: ResponseBody) -> bool {
        self.conn
            .dispatch(InboundFrame {
                correlation_id,
                body,
            })
            .await
    }
}

/// A single-shard bus with the fake connected.
pub async fn single_shard(request_timeout: Duration) -> (RpcClient, FakeShard) {
    let registry = BusRegistry::new(1);
    let shard = FakeShard::connect(&registry, 0).await;
    (RpcClient::new(registry, request_timeout, 32), shard)
}

/// Next message queued for a session. Panics if none arrives in time.
pub async fn next_message(rx: &mut mpsc::Receiver<Value>) -> Value {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no session message within timeout")
        .expect("session channel closed")
}

pub const ADMIN_TOKEN: &str = "admin-token";
pub const CLIENT_TOKEN: &str = "client-token";

/// Devices `dev-1` and `dev-2` on network 1, and `orphan` without one.
pub fn devices() -> Vec<Device> {
    ["dev-1", "dev-2"]
        .into_iter()
        .map(|guid| Device {
            guid: guid.into(),
            name: guid.into(),
            network_id: Some(1),
        })
        .chain([Device {
            guid: "orphan".into(),
            name: "orphan".into(),
            network_id: None,
        }])
        .collect()
}

/// A client principal limited to `dev-1`.
pub fn client_principal() -> Principal {
    Principal {
        role: Role::Client,
        user: None,
        device_guids: Some(["dev-1".to_string()].into()),
        device: None,
    }
}

/// Server state over a single fake shard, with an admin and a client token.
pub async fn app_state() -> (AppState, FakeShard) {
    let mut config = Config::default();
    config.bus.request_timeout_secs = 2;
    config.bus.subscribe_timeout_secs = 2;
    config.server.max_wait_timeout_secs = 1;

    let registry = BusRegistry::new(1);
    let shard = FakeShard::connect(&registry, 0).await;

    let mut auth = StaticTokenAuthenticator::default();
    auth.insert(ADMIN_TOKEN, Principal::admin());
    auth.insert(CLIENT_TOKEN, client_principal());

    let state = AppState::new(
        &config,
        registry,
        Arc::new(auth),
        Arc::new(InMemoryDeviceDirectory::new(devices())),
        Arc::new(SystemClock),
    );
    (state, shard)
}
