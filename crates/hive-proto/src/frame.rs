//! Wire frames exchanged with a backend shard.
//!
//! Every frame is a single JSON text message. Outbound frames carry the
//! correlation id the backend echoes on each reply, the partition key used
//! for routing, and whether the caller expects one reply, a stream, or none.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::body::{RequestBody, ResponseBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Single,
    Stream,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub reply: ReplyMode,
    pub body: RequestBody,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub correlation_id: Uuid,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown action {action:?} for correlation {correlation_id}")]
    UnknownAction { correlation_id: Uuid, action: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    correlation_id: Uuid,
    body: Value,
}

impl InboundFrame {
    /// Decode a reply frame.
    ///
    /// A frame with a readable correlation id but an action this build does
    /// not know yields [`FrameError::UnknownAction`], so the caller can still
    /// fail the waiter it belongs to.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawInbound =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let action = raw
            .body
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_owned);
        match serde_json::from_value::<ResponseBody>(raw.body) {
            Ok(body) => Ok(Self {
                correlation_id: raw.correlation_id,
                body,
            }),
            Err(e) => match action {
                Some(action) if !is_known_response(&action) => Err(FrameError::UnknownAction {
                    correlation_id: raw.correlation_id,
                    action,
                }),
                _ => Err(FrameError::Malformed(e.to_string())),
            },
        }
    }
}

fn is_known_response(action: &str) -> bool {
    matches!(
        action,
        "COMMAND_INSERT_RESPONSE"
            | "COMMAND_UPDATE_RESPONSE"
            | "COMMAND_SEARCH_RESPONSE"
            | "COMMAND_SUBSCRIBE_RESPONSE"
            | "COMMAND_UPDATE_SUBSCRIBE_RESPONSE"
            | "COMMAND_EVENT"
            | "NOTIFICATION_INSERT_RESPONSE"
            | "NOTIFICATION_SEARCH_RESPONSE"
            | "NOTIFICATION_SUBSCRIBE_RESPONSE"
            | "NOTIFICATION_EVENT"
            | "ERROR_RESPONSE"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::messages::{CommandSearchRequest, ErrorResponse};
    use serde_json::json;

    #[test]
    fn outbound_frame_carries_routing_fields() {
        let id = Uuid::new_v4();
        let frame = OutboundFrame {
            correlation_id: id,
            partition_key: Some("dev-1".into()),
            reply: ReplyMode::Single,
            body: RequestBody::CommandSearchRequest(CommandSearchRequest {
                id: Some(7),
                guid: Some("dev-1".into()),
                ..Default::default()
            }),
        };
        let v: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(v["correlationId"], id.to_string());
        assert_eq!(v["partitionKey"], "dev-1");
        assert_eq!(v["reply"], "single");
        assert_eq!(v["body"]["action"], "COMMAND_SEARCH_REQUEST");
        assert_eq!(v["body"]["id"], 7);
    }

    #[test]
    fn decodes_error_response() {
        let id = Uuid::new_v4();
        let text = json!({
            "correlationId": id,
            "body": { "action": "ERROR_RESPONSE", "code": 404, "message": "gone" },
        })
        .to_string();
        let frame = InboundFrame::decode(&text).unwrap();
        assert_eq!(frame.correlation_id, id);
        assert_eq!(
            frame.body,
            ResponseBody::ErrorResponse(ErrorResponse {
                code: 404,
                message: "gone".into()
            })
        );
    }

    #[test]
    fn unknown_action_keeps_correlation() {
        let id = Uuid::new_v4();
        let text = json!({
            "correlationId": id,
            "body": { "action": "DEVICE_DELETE_RESPONSE" },
        })
        .to_string();
        let err = InboundFrame::decode(&text).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnknownAction {
                correlation_id: id,
                action: "DEVICE_DELETE_RESPONSE".into()
            }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            InboundFrame::decode("not json"),
            Err(FrameError::Malformed(_))
        ));
        let text = json!({
            "correlationId": Uuid::new_v4(),
            "body": { "action": "COMMAND_INSERT_RESPONSE" },
        })
        .to_string();
        assert!(matches!(
            InboundFrame::decode(&text),
            Err(FrameError::Malformed(_))
        ));
    }
}
