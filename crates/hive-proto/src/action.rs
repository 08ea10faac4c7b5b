//! Closed set of bus message kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    CommandInsertRequest,
    CommandInsertResponse,
    CommandUpdateRequest,
    CommandUpdateResponse,
    CommandSearchRequest,
    CommandSearchResponse,
    CommandSubscribeRequest,
    CommandSubscribeResponse,
    CommandUnsubscribeRequest,
    CommandUpdateSubscribeRequest,
    CommandUpdateSubscribeResponse,
    CommandEvent,
    NotificationInsertRequest,
    NotificationInsertResponse,
    NotificationSearchRequest,
    NotificationSearchResponse,
    NotificationSubscribeRequest,
    NotificationSubscribeResponse,
    NotificationUnsubscribeRequest,
    NotificationEvent,
    ErrorResponse,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommandInsertRequest => "COMMAND_INSERT_REQUEST",
            Self::CommandInsertResponse => "COMMAND_INSERT_RESPONSE",
            Self::CommandUpdateRequest => "COMMAND_UPDATE_REQUEST",
            Self::CommandUpdateResponse => "COMMAND_UPDATE_RESPONSE",
            Self::CommandSearchRequest => "COMMAND_SEARCH_REQUEST",
            Self::CommandSearchResponse => "COMMAND_SEARCH_RESPONSE",
            Self::CommandSubscribeRequest => "COMMAND_SUBSCRIBE_REQUEST",
            Self::CommandSubscribeResponse => "COMMAND_SUBSCRIBE_RESPONSE",
            Self::CommandUnsubscribeRequest => "COMMAND_UNSUBSCRIBE_REQUEST",
            Self::CommandUpdateSubscribeRequest => "COMMAND_UPDATE_SUBSCRIBE_REQUEST",
            Self::CommandUpdateSubscribeResponse => "COMMAND_UPDATE_SUBSCRIBE_RESPONSE",
            Self::CommandEvent => "COMMAND_EVENT",
            Self::NotificationInsertRequest => "NOTIFICATION_INSERT_REQUEST",
            Self::NotificationInsertResponse => "NOTIFICATION_INSERT_RESPONSE",
            Self::NotificationSearchRequest => "NOTIFICATION_SEARCH_REQUEST",
            Self::NotificationSearchResponse => "NOTIFICATION_SEARCH_RESPONSE",
            Self::NotificationSubscribeRequest => "NOTIFICATION_SUBSCRIBE_REQUEST",
            Self::NotificationSubscribeResponse => "NOTIFICATION_SUBSCRIBE_RESPONSE",
            Self::NotificationUnsubscribeRequest => "NOTIFICATION_UNSUBSCRIBE_REQUEST",
            Self::NotificationEvent => "NOTIFICATION_EVENT",
            Self::ErrorResponse => "ERROR_RESPONSE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_display() {
        for action in [
            Action::CommandUpdateSubscribeResponse,
            Action::NotificationUnsubscribeRequest,
            Action::ErrorResponse,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, action.as_str());
        }
    }
}
