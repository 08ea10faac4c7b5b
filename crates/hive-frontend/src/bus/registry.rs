//! Registry of live shard connections and partition routing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hive_proto::OutboundFrame;
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};

use super::connection::ShardConnection;
use crate::rpc::RpcError;

/// Thread-safe registry of shard connections.
///
/// The shard count is fixed by configuration; a shard whose transport is
/// reconnecting is simply absent until it registers again.
#[derive(Clone)]
pub struct BusRegistry {
    shard_count: usize,
    shards: Arc<RwLock<HashMap<usize, Arc<ShardConnection>>>>,
    next: Arc<AtomicUsize>,
}

impl BusRegistry {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shard_count,
            shards: Arc::new(RwLock::new(HashMap::new())),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub const fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Register a connection for `shard`, replacing any previous one.
    pub async fn register(
        &self,
        shard: usize,
        endpoint: &str,
        frame_tx: mpsc::Sender<OutboundFrame>,
    ) -> Arc<ShardConnection> {
        let conn = Arc::new(ShardConnection::new(shard, endpoint, frame_tx));
        self.shards.write().await.insert(shard, Arc::clone(&conn));
        info!(shard, endpoint = %endpoint, "Shard connection registered");
        conn
    }

    /// Remove `conn` if it is still the registered connection for its shard.
    pub async fn unregister(&self, conn: &Arc<ShardConnection>) -> bool {
        let mut shards = self.shards.write().await;
        match shards.get(&conn.shard) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                shards.remove(&conn.shard);
                info!(shard = conn.shard, "Shard connection unregistered");
                true
            }
            _ => {
                warn!(shard = conn.shard, "Tried to unregister stale shard connection");
                false
            }
        }
    }

    pub async fn get(&self, shard: usize) -> Option<Arc<ShardConnection>> {
        self.shards.read().await.get(&shard).cloned()
    }

    pub async fn connected_count(&self) -> usize {
        self.shards.read().await.len()
    }

    /// Shard owning `key`. Stable for a given key and shard count.
    pub fn shard_for(&self, key: &str) -> usize {
        if self.shard_count == 0 {
            return 0;
        }
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let hash = u64::from_be_bytes(prefix);
        let count = u64::try_from(self.shard_count).unwrap_or(u64::MAX);
        usize::try_from(hash % count).unwrap_or(0)
    }

    /// Pick the connection for a request.
    ///
    /// Keyed requests must reach the shard owning the key. Unkeyed requests go
    /// round-robin over whichever shards are connected.
    pub async fn route(&self, partition_key: Option<&str>) -> Result<Arc<ShardConnection>, RpcError> {
        if self.shard_count == 0 {
            return Err(RpcError::NotConnected("no shards configured".into()));
        }
        let shards = self.shards.read().await;
        if let Some(key) = partition_key {
            let shard = self.shard_for(key);
            return shards
                .get(&shard)
                .cloned()
                .ok_or_else(|| RpcError::NotConnected(format!("shard {shard}")));
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed);
        (0..self.shard_count)
            .map(|offset| (start + offset) % self.shard_count)
            .find_map(|shard| shards.get(&shard).cloned())
            .ok_or_else(|| RpcError::NotConnected("no shard connected".into()))
    }
}
