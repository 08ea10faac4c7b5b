//! Client-facing messages pushed to a session.

use hive_core::model::{Command, Notification};
use serde_json::{Value, json};
use uuid::Uuid;

pub const COMMAND_INSERT: &str = "command/insert";
pub const COMMAND_UPDATE: &str = "command/update";
pub const NOTIFICATION_INSERT: &str = "notification/insert";

/// Frame for a command delivered on a command subscription.
pub fn command_insert_message(subscription_id: Uuid, command: &Command) -> Value {
    json!({
        "action": COMMAND_INSERT,
        "subscriptionId": subscription_id,
        "command": command,
    })
}

/// Frame for a command change delivered on a subscribe-on-update.
pub fn command_update_message(subscription_id: Uuid, command: &Command) -> Value {
    json!({
        "action": COMMAND_UPDATE,
        "subscriptionId": subscription_id,
        "command": command,
    })
}

pub fn notification_insert_message(subscription_id: Uuid, notification: &Notification) -> Value {
    json!({
        "action": NOTIFICATION_INSERT,
        "subscriptionId": subscription_id,
        "notification": notification,
    })
}

pub fn subscription_reply(subscription_id: Uuid) -> Value {
    json!({ "subscriptionId": subscription_id })
}
