//! Shard connections and partition routing for the RPC bus.

pub mod connection;
pub mod registry;

pub use connection::{ReplyItem, ShardConnection};
pub use registry::BusRegistry;
