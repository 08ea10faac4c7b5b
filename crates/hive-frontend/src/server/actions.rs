//! Websocket request dispatch.
//!
//! Every client message is a JSON object with an `action` and an optional
//! `requestId`. The reply echoes both and carries `"status": "success"` plus
//! the action's payload, or `"status": "error"` with `code` and `error`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use hive_core::auth::Principal;
use hive_core::model::{CommandWrapper, NotificationWrapper};
use hive_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::services::{CommandFilter, NotificationFilter, prepare_device_list};
use crate::session::{HeldSink, SessionSink, SinkError};
use crate::subscription::SubscriptionKind;

/// Client-facing action names.
mod names {
    pub const COMMAND_INSERT: &str = "command/insert";
    pub const COMMAND_UPDATE: &str = "command/update";
    pub const COMMAND_GET: &str = "command/get";
    pub const COMMAND_LIST: &str = "command/list";
    pub const COMMAND_SUBSCRIBE: &str = "command/subscribe";
    pub const COMMAND_UNSUBSCRIBE: &str = "command/unsubscribe";
    pub const COMMAND_WAIT: &str = "command/wait";
    pub const NOTIFICATION_INSERT: &str = "notification/insert";
    pub const NOTIFICATION_GET: &str = "notification/get";
    pub const NOTIFICATION_LIST: &str = "notification/list";
    pub const NOTIFICATION_SUBSCRIBE: &str = "notification/subscribe";
    pub const NOTIFICATION_UNSUBSCRIBE: &str = "notification/unsubscribe";
    pub const SERVER_INFO: &str = "server/info";
}

/// The session and caller a message arrived on.
pub struct ActionContext<'a> {
    pub state: &'a AppState,
    pub principal: &'a Principal,
    pub session: Arc<dyn SessionSink>,
    /// Subscription sinks created by the request in flight.
    held: Mutex<Vec<Arc<HeldSink>>>,
}

impl<'a> ActionContext<'a> {
    pub const fn new(
        state: &'a AppState,
        principal: &'a Principal,
        session: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            state,
            principal,
            session,
            held: Mutex::new(Vec::new()),
        }
    }

    /// A sink for a new subscription. It stays held until
    /// [`ActionContext::release_held`].
    fn subscriber(&self) -> Arc<dyn SessionSink> {
        let sink = HeldSink::new(Arc::clone(&self.session));
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&sink));
        sink
    }

    /// Let subscription messages queued during the last request through.
    pub fn release_held(&self) -> std::result::Result<(), SinkError> {
        let held = std::mem::take(&mut *self.held.lock().unwrap_or_else(PoisonError::into_inner));
        held.iter().try_for_each(|sink| sink.release())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandInsert {
    device_guid: Option<String>,
    command: CommandWrapper,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandUpdate {
    device_guid: Option<String>,
    command_id: i64,
    command: CommandWrapper,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByCommandId {
    device_guid: Option<String>,
    command_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandList {
    device_guid: Option<String>,
    names: Option<BTreeSet<String>>,
    timestamp: Option<DateTime<Utc>>,
    status: Option<String>,
    take: Option<u32>,
    has_response: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscribe {
    device_guids: Option<Vec<Option<String>>>,
    device_guid: Option<String>,
    names: Option<BTreeSet<String>>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Unsubscribe {
    subscription_id: Uuid,
    device_guids: Option<BTreeSet<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationInsert {
    device_guid: Option<String>,
    notification: NotificationWrapper,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByNotificationId {
    device_guid: Option<String>,
    notification_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationList {
    device_guid: Option<String>,
    names: Option<BTreeSet<String>>,
    timestamp: Option<DateTime<Utc>>,
    take: Option<u32>,
}

fn parse<T: DeserializeOwned>(request: &Value) -> Result<T> {
    serde_json::from_value(request.clone()).map_err(|e| Error::InvalidRequest(e.to_string()))
}

/// The device a request targets: the explicit `deviceGuid`, or the device a
/// device principal is bound to. A caller with neither is refused.
fn target_device(principal: &Principal, device_guid: Option<String>) -> Result<String> {
    device_guid
        .or_else(|| principal.device.clone())
        .ok_or_else(|| Error::Forbidden("deviceGuid is required".into()))
}

/// Handle one raw client message and queue its reply on the session.
///
/// Backlog and events of a subscription opened by this message follow the
/// reply, never precede it.
pub async fn respond(ctx: &ActionContext<'_>, text: &str) -> std::result::Result<(), SinkError> {
    let reply = dispatch(ctx, text).await;
    let sent = ctx.session.send_message(reply);
    let released = ctx.release_held();
    sent.and(released)
}

/// Handle one raw client message and build its reply.
pub async fn dispatch(ctx: &ActionContext<'_>, text: &str) -> Value {
    let request: Value = match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => return error_reply(None, None, &Error::InvalidRequest("Expected a JSON object".into())),
        Err(e) => return error_reply(None, None, &Error::InvalidRequest(e.to_string())),
    };
    let action = request.get("action").and_then(Value::as_str).map(str::to_string);
    let request_id = request.get("requestId").cloned();

    let Some(action) = action else {
        return error_reply(None, request_id, &Error::InvalidRequest("action is required".into()));
    };
    debug!(action = %action, "Websocket request");

    match handle(ctx, &action, &request).await {
        Ok(payload) => success_reply(&action, request_id, payload),
        Err(e) => {
            if e.status_code() >= 500 {
                warn!(action = %action, error = %e, "Websocket request failed");
            }
            error_reply(Some(&action), request_id, &e)
        }
    }
}

async fn handle(ctx: &ActionContext<'_>, action: &str, request: &Value) -> Result<Map<String, Value>> {
    let state = ctx.state;
    let principal = ctx.principal;
    let mut payload = Map::new();

    match action {
        names::COMMAND_INSERT => {
            let req: CommandInsert = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let command = state
                .commands
                .insert(req.command, &device, principal.user.as_ref())
                .await?;
            payload.insert("command".into(), serde_json::to_value(command)?);
        }
        names::COMMAND_UPDATE => {
            let req: CommandUpdate = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            state
                .commands
                .update(req.command_id, &device.guid, req.command)
                .await?;
        }
        names::COMMAND_GET => {
            let req: ByCommandId = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let command = state
                .commands
                .find(req.command_id, &device.guid)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Command with id = {} not found", req.command_id)))?;
            payload.insert("command".into(), serde_json::to_value(command)?);
        }
        names::COMMAND_LIST => {
            let req: CommandList = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let filter = CommandFilter {
                names: req.names,
                timestamp: req.timestamp,
                status: req.status,
                take: req.take,
                has_response: req.has_response,
            };
            let commands = state.commands.find_many(&[device.guid], &filter).await?;
            payload.insert("commands".into(), serde_json::to_value(commands)?);
        }
        names::COMMAND_SUBSCRIBE => {
            let req: Subscribe = parse(request)?;
            let requested = prepare_device_list(req.device_guids, req.device_guid)?;
            let devices = state.device_scope(principal, requested)?;
            let id = state
                .commands
                .subscribe(devices, req.names, req.timestamp, ctx.subscriber())
                .await?;
            payload.insert("subscriptionId".into(), Value::String(id.to_string()));
        }
        names::COMMAND_UNSUBSCRIBE => {
            let req: Unsubscribe = parse(request)?;
            let kinds = [SubscriptionKind::Command, SubscriptionKind::CommandUpdate];
            ensure_owned(ctx, req.subscription_id, &kinds).await?;
            state
                .commands
                .unsubscribe(req.subscription_id, req.device_guids)
                .await?;
        }
        names::COMMAND_WAIT => {
            let req: ByCommandId = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let (id, command) = state
                .commands
                .subscribe_on_update(req.command_id, &device.guid, ctx.subscriber())
                .await?;
            payload.insert("subscriptionId".into(), Value::String(id.to_string()));
            payload.insert("command".into(), serde_json::to_value(command)?);
        }
        names::NOTIFICATION_INSERT => {
            let req: NotificationInsert = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let notification = state.notifications.insert(req.notification, &device).await?;
            payload.insert("notification".into(), serde_json::to_value(notification)?);
        }
        names::NOTIFICATION_GET => {
            let req: ByNotificationId = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let notification = state
                .notifications
                .find(req.notification_id, &device.guid)
                .await?
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "Notification with id = {} not found",
                        req.notification_id
                    ))
                })?;
            payload.insert("notification".into(), serde_json::to_value(notification)?);
        }
        names::NOTIFICATION_LIST => {
            let req: NotificationList = parse(request)?;
            let device = state.resolve_device(principal, &target_device(principal, req.device_guid)?)?;
            let filter = NotificationFilter {
                names: req.names,
                timestamp: req.timestamp,
                take: req.take,
            };
            let notifications = state
                .notifications
                .find_many(&[device.guid], &filter)
                .await?;
            payload.insert("notifications".into(), serde_json::to_value(notifications)?);
        }
        names::NOTIFICATION_SUBSCRIBE => {
            let req: Subscribe = parse(request)?;
            let requested = prepare_device_list(req.device_guids, req.device_guid)?;
            let devices = state.device_scope(principal, requested)?;
            let id = state
                .notifications
                .subscribe(devices, req.names, req.timestamp, ctx.subscriber())
                .await?;
            payload.insert("subscriptionId".into(), Value::String(id.to_string()));
        }
        names::NOTIFICATION_UNSUBSCRIBE => {
            let req: Unsubscribe = parse(request)?;
            ensure_owned(ctx, req.subscription_id, &[SubscriptionKind::Notification]).await?;
            state
                .notifications
                .unsubscribe(req.subscription_id, req.device_guids)
                .await?;
        }
        names::SERVER_INFO => {
            payload.insert("serverTimestamp".into(), serde_json::to_value(state.clock.now())?);
            payload.insert("busShards".into(), json!(state.bus.shard_count()));
            payload.insert("connectedShards".into(), json!(state.bus.connected_count().await));
        }
        other => {
            warn!(action = %other, "Unknown websocket action");
            return Err(Error::InvalidRequest(format!("Unknown action: {other}")));
        }
    }
    Ok(payload)
}

/// A session may only cancel its own subscriptions of the matching kind.
async fn ensure_owned(
    ctx: &ActionContext<'_>,
    subscription_id: Uuid,
    kinds: &[SubscriptionKind],
) -> Result<()> {
    let subscriptions = &ctx.state.subscriptions;
    let owned = subscriptions.owner(&subscription_id).await == Some(ctx.session.session_id());
    let kind_matches = subscriptions
        .kind(&subscription_id)
        .await
        .is_some_and(|k| kinds.contains(&k));
    if owned && kind_matches {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "Subscription {subscription_id} not found"
        )))
    }
}

fn success_reply(action: &str, request_id: Option<Value>, payload: Map<String, Value>) -> Value {
    let mut reply = Map::new();
    reply.insert("action".into(), Value::String(action.to_string()));
    reply.insert("requestId".into(), request_id.unwrap_or(Value::Null));
    reply.insert("status".into(), Value::String("success".into()));
    reply.extend(payload);
    Value::Object(reply)
}

fn error_reply(action: Option<&str>, request_id: Option<Value>, error: &Error) -> Value {
    json!({
        "action": action,
        "requestId": request_id,
        "status": "error",
        "code": error.status_code(),
        "error": error.to_string(),
    })
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod actions_tests;
