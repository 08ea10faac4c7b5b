use serde::{Deserialize, Serialize};

/// A registered device as resolved by the device directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub guid: String,
    pub name: String,
    /// Devices without a network cannot exchange messages.
    #[serde(default)]
    pub network_id: Option<i64>,
}

/// The human user behind a principal, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
}
