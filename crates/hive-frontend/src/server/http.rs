//! REST surface for commands and notifications of a single device.

use std::collections::BTreeSet;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use hive_core::Error;
use hive_core::model::{Command, CommandWrapper, NotificationWrapper};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery, Authenticated};
use super::state::AppState;
use crate::services::{CommandFilter, NotificationFilter};
use crate::session::ClientSession;

const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

type ApiResult<T> = Result<T, ApiError>;

/// Split a comma-separated `names` parameter.
pub(super) fn parse_names(names: Option<&str>) -> Option<BTreeSet<String>> {
    names.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CommandQuery {
    names: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    status: Option<String>,
    take: Option<u32>,
    has_response: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NotificationQuery {
    names: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    take: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PollQuery {
    wait_timeout: Option<u64>,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "busShards": state.bus.shard_count(),
        "connectedShards": state.bus.connected_count().await,
        "subscriptions": state.subscriptions.len().await,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

pub(super) async fn insert_command(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(guid): Path<String>,
    ApiJson(wrapper): ApiJson<CommandWrapper>,
) -> ApiResult<Response> {
    let device = state.resolve_device(&principal, &guid)?;
    let command = state
        .commands
        .insert(wrapper, &device, principal.user.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(command)).into_response())
}

pub(super) async fn list_commands(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(guid): Path<String>,
    ApiQuery(query): ApiQuery<CommandQuery>,
) -> ApiResult<Json<Vec<Command>>> {
    let device = state.resolve_device(&principal, &guid)?;
    let filter = CommandFilter {
        names: parse_names(query.names.as_deref()),
        timestamp: query.timestamp,
        status: query.status,
        take: query.take,
        has_response: query.has_response,
    };
    let commands = state.commands.find_many(&[device.guid], &filter).await?;
    Ok(Json(commands))
}

pub(super) async fn get_command(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((guid, id)): Path<(String, i64)>,
) -> ApiResult<Json<Command>> {
    let device = state.resolve_device(&principal, &guid)?;
    let command = state
        .commands
        .find(id, &device.guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Command with id = {id} not found")))?;
    Ok(Json(command))
}

pub(super) async fn update_command(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((guid, id)): Path<(String, i64)>,
    ApiJson(wrapper): ApiJson<CommandWrapper>,
) -> ApiResult<StatusCode> {
    let device = state.resolve_device(&principal, &guid)?;
    state.commands.update(id, &device.guid, wrapper).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Wait for the next update of a command.
///
/// A command that was already updated is returned immediately. Otherwise the
/// call holds until an update arrives or `waitTimeout` expires, in which case
/// the response is `204 No Content`.
pub(super) async fn poll_command(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((guid, id)): Path<(String, i64)>,
    ApiQuery(query): ApiQuery<PollQuery>,
) -> ApiResult<Response> {
    let device = state.resolve_device(&principal, &guid)?;
    let wait = Duration::from_secs(query.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS))
        .min(state.settings.max_wait_timeout);

    let (session, mut updates) = ClientSession::new(state.settings.session_queue_depth);
    let _guard = session.close_on_drop();
    let (subscription_id, snapshot) = state
        .commands
        .subscribe_on_update(id, &device.guid, session.clone())
        .await?;
    debug!(%subscription_id, command_id = id, "Polling command");

    if snapshot.is_updated || wait.is_zero() {
        return Ok(Json(snapshot).into_response());
    }
    // Returning drops the guard, which tears the update subscription down
    match tokio::time::timeout(wait, updates.recv()).await {
        Ok(Some(mut frame)) => Ok(Json(frame["command"].take()).into_response()),
        Ok(None) | Err(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub(super) async fn insert_notification(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(guid): Path<String>,
    ApiJson(wrapper): ApiJson<NotificationWrapper>,
) -> ApiResult<Response> {
    let device = state.resolve_device(&principal, &guid)?;
    let notification = state.notifications.insert(wrapper, &device).await?;
    Ok((StatusCode::CREATED, Json(notification)).into_response())
}

pub(super) async fn list_notifications(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(guid): Path<String>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ApiResult<Response> {
    let device = state.resolve_device(&principal, &guid)?;
    let filter = NotificationFilter {
        names: parse_names(query.names.as_deref()),
        timestamp: query.timestamp,
        take: query.take,
    };
    let notifications = state
        .notifications
        .find_many(&[device.guid], &filter)
        .await?;
    Ok(Json(notifications).into_response())
}

pub(super) async fn get_notification(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((guid, id)): Path<(String, i64)>,
) -> ApiResult<Response> {
    let device = state.resolve_device(&principal, &guid)?;
    let notification = state
        .notifications
        .find(id, &device.guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Notification with id = {id} not found")))?;
    Ok(Json(notification).into_response())
}
