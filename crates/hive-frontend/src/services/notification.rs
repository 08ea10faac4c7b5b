//! Notification operations over the RPC bus.
//!
//! Notifications are immutable: there is insert, search and subscribe, but no
//! update.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use hive_core::model::{Device, Notification, NotificationWrapper};
use hive_core::time::TimestampSource;
use hive_core::validate::Validate;
use hive_core::{Error, Result};
use hive_proto::messages::{
    NotificationInsertRequest, NotificationSearchRequest, NotificationSubscribeRequest,
};
use hive_proto::{RequestBody, ResponseBody};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::rpc::{RpcClient, RpcError, RpcRequest};
use crate::session::SessionSink;
use crate::subscription::{SubscribeSpec, SubscriptionKind, SubscriptionManager};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub names: Option<BTreeSet<String>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub take: Option<u32>,
}

#[derive(Clone)]
pub struct NotificationService {
    rpc: RpcClient,
    subscriptions: SubscriptionManager,
    clock: Arc<dyn TimestampSource>,
}

impl NotificationService {
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

    /// Record a notification from `device`. The backend assigns its id.
    #[instrument(skip(self, wrapper, device), fields(device_guid = %device.guid))]
    pub async fn insert(&self, wrapper: NotificationWrapper, device: &Device) -> Result<Notification> {
        let notification = wrapper.into_notification(device.guid.as_str(), self.clock.now())?;
        notification.validate()?;

        let request = RpcRequest::new(RequestBody::NotificationInsertRequest(
            NotificationInsertRequest { notification },
        ))
        .with_partition_key(device.guid.as_str());
        match self.rpc.call(request).await? {
            ResponseBody::NotificationInsertResponse(r) => {
                info!(notification_id = ?r.notification.id, "Notification inserted");
                Ok(r.notification)
            }
            other => Err(RpcError::UnexpectedResponse(other.action()).into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn find(&self, id: i64, device_guid: &str) -> Result<Option<Notification>> {
        let request = RpcRequest::new(RequestBody::NotificationSearchRequest(
            NotificationSearchRequest {
                id: Some(id),
                guid: Some(device_guid.to_string()),
                ..Default::default()
            },
        ))
        .with_partition_key(device_guid);
        match self.rpc.call(request).await? {
            ResponseBody::NotificationSearchResponse(r) => Ok(r.notifications.into_iter().next()),
            other => Err(RpcError::UnexpectedResponse(other.action()).into()),
        }
    }

    /// Search every device in `guids`; results follow the order of `guids`.
    #[instrument(skip(self, guids, filter), fields(devices = guids.len()))]
    pub async fn find_many(
        &self,
        guids: &[String],
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let searches = guids.iter().map(|guid| {
            let request = RpcRequest::new(RequestBody::NotificationSearchRequest(
                NotificationSearchRequest {
                    id: None,
                    guid: Some(guid.clone()),
                    names: filter.names.clone(),
                    timestamp: filter.timestamp,
                    take: filter.take,
                },
            ))
            .with_partition_key(guid.as_str());
            async move {
                match self.rpc.call(request).await {
                    Ok(ResponseBody::NotificationSearchResponse(r)) => Ok(r.notifications),
                    Ok(other) => Err(RpcError::UnexpectedResponse(other.action())),
                    Err(e) => Err(e),
                }
            }
        });
        let per_device = try_join_all(searches).await?;
        Ok(per_device.into_iter().flatten().collect())
    }

    /// Subscribe `sink` to new notifications of `devices`.
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
            kind: SubscriptionKind::Notification,
            devices,
            names,
            sink,
        };
        let subscribed = self
            .subscriptions
            .subscribe(spec, move |subscription_id, device| {
                RequestBody::NotificationSubscribeRequest(NotificationSubscribeRequest {
                    subscription_id,
                    device: device.to_string(),
                    names: filter.clone(),
                    timestamp,
                })
            })
            .await?;
        Ok(subscribed.subscription_id)
    }

    /// Push `NOTIFICATION_UNSUBSCRIBE_REQUEST` and drop the subscription.
    pub async fn unsubscribe(
        &self,
        subscription_id: Uuid,
        device_guids: Option<BTreeSet<String>>,
    ) -> Result<()> {
        self.subscriptions
            .unsubscribe(subscription_id, device_guids)
            .await
    }
}

/// Resolve the device set of a subscribe request.
///
/// `None` means every device the principal may see. Giving both a list and a
/// single guid is rejected.
pub fn prepare_device_list(
    guids: Option<Vec<Option<String>>>,
    guid: Option<String>,
) -> Result<Option<BTreeSet<String>>> {
    match (guids, guid) {
        (None, None) => Ok(None),
        (Some(guids), None) => Ok(Some(guids.into_iter().flatten().collect())),
        (None, Some(guid)) => Ok(Some(BTreeSet::from([guid]))),
        (Some(_), Some(_)) => Err(Error::InvalidRequest(
            "Both deviceGuids and deviceGuid are specified".into(),
        )),
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod notification_tests;
