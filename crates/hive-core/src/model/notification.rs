use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::field::Field;

/// A notification emitted by a device. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Option<i64>,
    pub device_guid: String,
    pub notification: String,
    pub parameters: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Inbound notification payload with three-state fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWrapper {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub notification: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub parameters: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub timestamp: Field<DateTime<Utc>>,
}

impl NotificationWrapper {
    /// Build a notification for `device_guid`.
    ///
    /// `server_time` is used unless the wrapper carries its own timestamp.
    pub fn into_notification(
        self,
        device_guid: impl Into<String>,
        server_time: DateTime<Utc>,
    ) -> Result<Notification> {
        let Field::Value(name) = self.notification else {
            return Err(Error::InvalidRequest("Notification is required".into()));
        };
        let mut parameters = None;
        self.parameters.apply(&mut parameters);
        let mut timestamp = None;
        self.timestamp.apply(&mut timestamp);

        Ok(Notification {
            id: None,
            device_guid: device_guid.into(),
            notification: name,
            parameters,
            timestamp: timestamp.unwrap_or(server_time),
        })
    }
}
