//! RPC bus vocabulary shared by the frontend and the backend cluster.
//!
//! Request and response bodies are tagged unions discriminated by their
//! `action` field, so a reply is dispatched with a single `match`.

pub mod action;
pub mod body;
pub mod envelope;
pub mod frame;
pub mod messages;

pub use action::Action;
pub use body::{RequestBody, ResponseBody};
pub use frame::{FrameError, InboundFrame, OutboundFrame, ReplyMode};
