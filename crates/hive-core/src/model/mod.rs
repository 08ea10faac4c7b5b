//! Domain model exchanged between clients, the frontend and the backend.

mod command;
mod device;
mod notification;

pub use command::{Command, CommandWrapper};
pub use device::{Device, User};
pub use notification::{Notification, NotificationWrapper};
