//! Domain services: commands and notifications over the RPC bus.

pub mod command;
pub mod notification;

pub use command::{CommandFilter, CommandService};
pub use notification::{NotificationFilter, NotificationService, prepare_device_list};
