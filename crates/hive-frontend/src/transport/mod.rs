//! Backend shard transport.
//!
//! One task per configured endpoint keeps a websocket open to the shard,
//! registers it on the bus while connected, and fails every in-flight
//! correlation of the shard when the socket drops.

pub mod error;
pub mod ws;

use hive_core::config::BusConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use error::TransportError;
pub use ws::ShardTransport;

use crate::bus::BusRegistry;

/// Spawn a transport task for every configured shard endpoint.
pub fn spawn_transports(
    config: &BusConfig,
    registry: &BusRegistry,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    config
        .endpoints
        .iter()
        .enumerate()
        .map(|(shard, endpoint)| {
            let transport = ShardTransport::new(shard, endpoint.clone(), registry.clone(), config);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { transport.run(shutdown).await })
        })
        .collect()
}
