//! DeviceHive frontend edge
//!
//! Sits between client sessions and the backend cluster:
//! - RPC bus client with correlation, partition routing and timeouts
//! - Command and notification services
//! - Subscription registry with per-session fan-out
//! - Websocket and HTTP surfaces for clients
//! - Websocket transport to the backend shards

pub mod bus;
pub mod rpc;
pub mod server;
pub mod services;
pub mod session;
pub mod subscription;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
