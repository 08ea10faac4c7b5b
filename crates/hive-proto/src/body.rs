//! Tagged request and response bodies.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::messages::{
    CommandEvent, CommandInsertRequest, CommandInsertResponse, CommandSearchRequest,
    CommandSearchResponse, CommandSubscribeRequest, CommandSubscribeResponse,
    CommandUnsubscribeRequest, CommandUpdateRequest, CommandUpdateResponse,
    CommandUpdateSubscribeRequest, CommandUpdateSubscribeResponse, ErrorResponse,
    NotificationEvent, NotificationInsertRequest, NotificationInsertResponse,
    NotificationSearchRequest, NotificationSearchResponse, NotificationSubscribeRequest,
    NotificationSubscribeResponse, NotificationUnsubscribeRequest,
};

/// Body of a request sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestBody {
    CommandInsertRequest(CommandInsertRequest),
    CommandUpdateRequest(CommandUpdateRequest),
    CommandSearchRequest(CommandSearchRequest),
    CommandSubscribeRequest(CommandSubscribeRequest),
    CommandUnsubscribeRequest(CommandUnsubscribeRequest),
    CommandUpdateSubscribeRequest(CommandUpdateSubscribeRequest),
    NotificationInsertRequest(NotificationInsertRequest),
    NotificationSearchRequest(NotificationSearchRequest),
    NotificationSubscribeRequest(NotificationSubscribeRequest),
    NotificationUnsubscribeRequest(NotificationUnsubscribeRequest),
}

impl RequestBody {
    pub const fn action(&self) -> Action {
        match self {
            Self::CommandInsertRequest(_) => Action::CommandInsertRequest,
            Self::CommandUpdateRequest(_) => Action::CommandUpdateRequest,
            Self::CommandSearchRequest(_) => Action::CommandSearchRequest,
            Self::CommandSubscribeRequest(_) => Action::CommandSubscribeRequest,
            Self::CommandUnsubscribeRequest(_) => Action::CommandUnsubscribeRequest,
            Self::CommandUpdateSubscribeRequest(_) => Action::CommandUpdateSubscribeRequest,
            Self::NotificationInsertRequest(_) => Action::NotificationInsertRequest,
            Self::NotificationSearchRequest(_) => Action::NotificationSearchRequest,
            Self::NotificationSubscribeRequest(_) => Action::NotificationSubscribeRequest,
            Self::NotificationUnsubscribeRequest(_) => Action::NotificationUnsubscribeRequest,
        }
    }
}

/// Body of a reply pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseBody {
    CommandInsertResponse(CommandInsertResponse),
    CommandUpdateResponse(CommandUpdateResponse),
    CommandSearchResponse(CommandSearchResponse),
    CommandSubscribeResponse(CommandSubscribeResponse),
    CommandUpdateSubscribeResponse(CommandUpdateSubscribeResponse),
    CommandEvent(CommandEvent),
    NotificationInsertResponse(NotificationInsertResponse),
    NotificationSearchResponse(NotificationSearchResponse),
    NotificationSubscribeResponse(NotificationSubscribeResponse),
    NotificationEvent(NotificationEvent),
    ErrorResponse(ErrorResponse),
}

impl ResponseBody {
    pub const fn action(&self) -> Action {
        match self {
            Self::CommandInsertResponse(_) => Action::CommandInsertResponse,
            Self::CommandUpdateResponse(_) => Action::CommandUpdateResponse,
            Self::CommandSearchResponse(_) => Action::CommandSearchResponse,
            Self::CommandSubscribeResponse(_) => Action::CommandSubscribeResponse,
            Self::CommandUpdateSubscribeResponse(_) => Action::CommandUpdateSubscribeResponse,
            Self::CommandEvent(_) => Action::CommandEvent,
            Self::NotificationInsertResponse(_) => Action::NotificationInsertResponse,
            Self::NotificationSearchResponse(_) => Action::NotificationSearchResponse,
            Self::NotificationSubscribeResponse(_) => Action::NotificationSubscribeResponse,
            Self::NotificationEvent(_) => Action::NotificationEvent,
            Self::ErrorResponse(_) => Action::ErrorResponse,
        }
    }
}
