//! Subscription registry and per-session fan-out.

pub mod manager;
pub mod pump;
pub mod registry;

pub use manager::{SubscribeSpec, Subscribed, SubscriptionManager};
pub use registry::{SubscriptionEntry, SubscriptionKind, SubscriptionRegistry};
