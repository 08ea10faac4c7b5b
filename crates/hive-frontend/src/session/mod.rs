//! Client sessions as seen by the core.
//!
//! The core only ever talks to a [`SessionSink`]: send a message, ask whether
//! the session is still open, and register a callback for when it closes.
//! [`ClientSession`] is the queue-backed sink the websocket and HTTP surfaces
//! hand out.

pub mod client;
pub mod held;
pub mod sink;

pub use client::{ClientSession, CloseGuard};
pub use held::HeldSink;
pub use sink::{CloseCallback, SessionSink, SinkError};
