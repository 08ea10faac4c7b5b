//! DeviceHive frontend core library
//!
//! Shared functionality for the frontend edge:
//! - Domain model for commands and notifications, with three-state wrappers
//! - Validation rules applied before anything reaches the bus
//! - Principals, device directory and the server time source
//! - Configuration resolution and tracing initialisation
//! - Common error types

pub mod auth;
pub mod config;
pub mod error;
pub mod field;
pub mod model;
pub mod time;
pub mod tracing_init;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use field::Field;
