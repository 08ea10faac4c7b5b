//! RPC bus client.
//!
//! Every request gets a fresh correlation id. Single-reply calls park a
//! oneshot waiter bounded by the request timeout; streaming calls hand back a
//! [`ReplyStream`] that yields every reply on the correlation until it is
//! released or the shard drops.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ReplyStream, RpcClient, StreamHandle};
pub use error::RpcError;
pub use request::RpcRequest;
