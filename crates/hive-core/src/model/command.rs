use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::Field;

/// A command sent to a device.
///
/// `id` is assigned by the backend on insert; a command built by the frontend
/// carries `None` until the insert response comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: Option<i64>,
    pub device_guid: String,
    pub user_id: Option<i64>,
    pub command: Option<String>,
    pub parameters: Option<Value>,
    pub lifetime: Option<i32>,
    pub status: Option<String>,
    pub result: Option<Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_updated: bool,
}

impl Command {
    /// Fresh, not yet persisted command for `device_guid`.
    pub fn new(device_guid: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            device_guid: device_guid.into(),
            user_id: None,
            command: None,
            parameters: None,
            lifetime: None,
            status: None,
            result: None,
            timestamp,
            is_updated: false,
        }
    }

    /// Flag the command as updated. There is no way back to `false`.
    pub const fn mark_updated(&mut self) {
        self.is_updated = true;
    }
}

/// Inbound command payload with three-state fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandWrapper {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub command: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub parameters: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub lifetime: Field<i32>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub status: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub result: Field<Value>,
}

impl CommandWrapper {
    /// Patch `command` with every present field.
    pub fn apply_to(self, command: &mut Command) {
        self.command.apply(&mut command.command);
        self.parameters.apply(&mut command.parameters);
        self.lifetime.apply(&mut command.lifetime);
        self.status.apply(&mut command.status);
        self.result.apply(&mut command.result);
    }

    /// Wrapper with every field present, taken from `command`.
    pub fn from_command(command: &Command) -> Self {
        Self {
            command: Field::from_option(command.command.clone()),
            parameters: Field::from_option(command.parameters.clone()),
            lifetime: Field::from_option(command.lifetime),
            status: Field::from_option(command.status.clone()),
            result: Field::from_option(command.result.clone()),
        }
    }
}
