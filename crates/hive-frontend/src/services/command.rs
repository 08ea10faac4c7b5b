//! Command operations over the RPC bus.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use hive_core::model::{Command, CommandWrapper, Device, User};
use hive_core::time::TimestampSource;
use hive_core::validate::Validate;
use hive_core::{Error, Result};
use hive_proto::messages::{
    CommandInsertRequest, CommandSearchRequest, CommandSubscribeRequest,
    CommandUpdateRequest, CommandUpdateSubscribeRequest,
};
use hive_proto::{RequestBody, ResponseBody};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::rpc::{RpcClient, RpcError, RpcRequest};
use crate::session::SessionSink;
use crate::subscription::{SubscribeSpec, SubscriptionKind, SubscriptionManager};

/// Filter for a multi-device command search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFilter {
    pub names: Option<BTreeSet<String>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub take: Option<u32>,
    pub has_response: Option<bool>,
}

#[derive(Clone)]
pub struct CommandService {
    rpc: RpcClient,
    subscriptions: SubscriptionManager,
    clock: Arc<dyn TimestampSource>,
}

impl CommandService {
    pub fn new(
        rpc: RpcClient,
        subscriptions: SubscriptionManager,
        clock: Arc<dyn TimestampSource>,
    ) -> Self {
        Self {
            rpc,
            subscriptions,
            clock,
        }
    }

    /// Look up one command of a device.
    #[instrument(skip(self))]
    pub async fn find(&self, id: i64, device_guid: &str) -> Result<Option<Command>> {
        let request = RpcRequest::new(RequestBody::CommandSearchRequest(CommandSearchRequest {
            id: Some(id),
            guid: Some(device_guid.to_string()),
            ..Default::default()
        }))
        .with_partition_key(device_guid);
        match self.rpc.call(request).await? {
            ResponseBody::CommandSearchResponse(r) => Ok(r.commands.into_iter().next()),
            other => Err(RpcError::UnexpectedResponse(other.action()).into()),
        }
    }

    /// Search every device in `guids`, one request per device.
    ///
    /// Results keep per-device order and the order of `guids`. Any failed
    /// search fails the whole call.
    #[instrument(skip(self, guids, filter), fields(devices = guids.len()))]
    pub async fn find_many(&self, guids: &[String], filter: &CommandFilter) -> Result<Vec<Command>> {
        let searches = guids.iter().map(|guid| {
            let request =
                RpcRequest::new(RequestBody::CommandSearchRequest(CommandSearchRequest {
                    id: None,
                    guid: Some(guid.clone()),
                    names: filter.names.clone(),
                    timestamp: filter.timestamp,
                    status: filter.status.clone(),
                    take: filter.take,
                    has_response: filter.has_response,
                }))
                .with_partition_key(guid.as_str());
            async move {
                match self.rpc.call(request).await {
                    Ok(ResponseBody::CommandSearchResponse(r)) => Ok(r.commands),
                    Ok(other) => Err(RpcError::UnexpectedResponse(other.action())),
                    Err(e) => Err(e),
                }
            }
        });
        let per_device = try_join_all(searches).await?;
        Ok(per_device.into_iter().flatten().collect())
    }

    /// Create a command for `device`. The backend assigns its id.
    #[instrument(skip(self, wrapper, device, user), fields(device_guid = %device.guid))]
    pub async fn insert(
        &self,
        wrapper: CommandWrapper,
        device: &Device,
        user: Option<&User>,
    ) -> Result<Command> {
        let mut command = Command::new(device.guid.as_str(), self.clock.now());
        command.user_id = user.map(|u| u.id);
        wrapper.apply_to(&mut command);
        command.validate()?;

        let request = RpcRequest::new(RequestBody::CommandInsertRequest(CommandInsertRequest {
            command,
        }))
        .with_partition_key(device.guid.as_str());
        match self.rpc.call(request).await? {
            ResponseBody::CommandInsertResponse(r) => {
                info!(command_id = ?r.command.id, "Command inserted");
                Ok(r.command)
            }
            other => Err(RpcError::UnexpectedResponse(other.action()).into()),
        }
    }

    /// Apply `wrapper` to an existing command and send the update.
    #[instrument(skip(self, wrapper))]
    pub async fn update(
        &self,
        command_id: i64,
        device_guid: &str,
        wrapper: CommandWrapper,
    ) -> Result<()> {
        let mut command = self.find(command_id, device_guid).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "Command {command_id} of device {device_guid} not found"
            ))
        })?;
        command.mark_updated();
        wrapper.apply_to(&mut command);
        command.validate()?;

        let request = RpcRequest::new(RequestBody::CommandUpdateRequest(CommandUpdateRequest {
            command,
        }))
        .with_partition_key(device_guid);
        match self.rpc.call(request).await? {
            ResponseBody::CommandUpdateResponse(_) => {
                debug!("Command updated");
                Ok(())
            }
            other => Err(RpcError::UnexpectedResponse(other.action()).into()),
        }
    }

    /// Subscribe `sink` to new commands of `devices`.
    ///
    /// Returns once every device has acknowledged. Commands queued since
    /// `timestamp` are delivered first.
    #[instrument(skip(self, devices, names, sink), fields(devices = devices.len()))]
    pub async fn subscribe(
        &self,
        devices: BTreeSet<String>,
        names: Option<BTreeSet<String>>,
        timestamp: Option<DateTime<Utc>>,
        sink: Arc<dyn SessionSink>,
    ) -> Result<Uuid> {
        let filter = names.clone();
        let spec = SubscribeSpec {
            kind: SubscriptionKind::Command,
            devices,
            names,
            sink,
        };
        let subscribed = self
            .subscriptions
            .subscribe(spec, move |subscription_id, device| {
                RequestBody::CommandSubscribeRequest(CommandSubscribeRequest {
                    subscription_id,
                    device: device.to_string(),
                    names: filter.clone(),
                    timestamp,
                })
            })
            .await?;
        Ok(subscribed.subscription_id)
    }

    pub async fn unsubscribe(
        &self,
        subscription_id: Uuid,
        device_guids: Option<BTreeSet<String>>,
    ) -> Result<()> {
        self.subscriptions
            .unsubscribe(subscription_id, device_guids)
            .await
    }

    /// Current state of a command plus a subscription streaming its updates.
    #[instrument(skip(self, sink))]
    pub async fn subscribe_on_update(
        &self,
        command_id: i64,
        device_guid: &str,
        sink: Arc<dyn SessionSink>,
    ) -> Result<(Uuid, Command)> {
        let spec = SubscribeSpec {
            kind: SubscriptionKind::CommandUpdate,
            devices: BTreeSet::from([device_guid.to_string()]),
            names: None,
            sink,
        };
        let subscribed = self
            .subscriptions
            .subscribe(spec, move |subscription_id, device| {
                RequestBody::CommandUpdateSubscribeRequest(CommandUpdateSubscribeRequest {
                    subscription_id,
                    command_id,
                    guid: device.to_string(),
                })
            })
            .await?;

        if let Some(command) = subscribed.snapshot {
            return Ok((subscribed.subscription_id, command));
        }
        self.subscriptions
            .unsubscribe(subscribed.subscription_id, None)
            .await?;
        Err(Error::NotFound(format!(
            "Command {command_id} of device {device_guid} not found"
        )))
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod command_tests;
