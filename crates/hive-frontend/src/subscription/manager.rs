//! Subscription lifecycle: register, subscribe on every device, wait for the
//! barrier, unsubscribe, and clean up when a session closes.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hive_core::model::Command;
use hive_core::{Error, Result};
use hive_proto::RequestBody;
use hive_proto::messages::{CommandUnsubscribeRequest, NotificationUnsubscribeRequest};
use tokio::runtime::Handle;
use tokio::sync::{RwLock, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pump::Pump;
use super::registry::{SubscriptionEntry, SubscriptionKind, SubscriptionRegistry};
use crate::rpc::{RpcClient, RpcRequest};
use crate::session::SessionSink;

/// What to subscribe to and where events go.
pub struct SubscribeSpec {
    pub kind: SubscriptionKind,
    pub devices: BTreeSet<String>,
    pub names: Option<BTreeSet<String>>,
    pub sink: Arc<dyn SessionSink>,
}

/// A subscription every device has acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribed {
    pub subscription_id: Uuid,
    /// Current command state, for update subscriptions.
    pub snapshot: Option<Command>,
}

#[derive(Clone)]
pub struct SubscriptionManager {
    rpc: RpcClient,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    /// Sessions whose close already triggers [`SubscriptionManager::close_session`].
    hooked_sessions: Arc<Mutex<HashSet<Uuid>>>,
    subscribe_timeout: Duration,
}

impl SubscriptionManager {
    pub fn new(rpc: RpcClient, subscribe_timeout: Duration) -> Self {
        Self {
            rpc,
            registry: Arc::new(RwLock::new(SubscriptionRegistry::default())),
            hooked_sessions: Arc::new(Mutex::new(HashSet::new())),
            subscribe_timeout,
        }
    }

    /// Subscribe on every device of `spec` and wait until all acknowledged.
    ///
    /// `build` produces the per-device subscribe body for the generated id.
    /// The entry is registered before the first request goes out, so events
    /// racing the acknowledgements still reach the sink. On failure or
    /// timeout nothing stays registered.
    pub async fn subscribe<F>(&self, spec: SubscribeSpec, build: F) -> Result<Subscribed>
    where
        F: Fn(Uuid, &str) -> RequestBody,
    {
        let SubscribeSpec {
            kind,
            devices,
            names,
            sink,
        } = spec;
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let entry = SubscriptionEntry {
            id,
            kind,
            devices: devices.clone(),
            names,
            session_id: sink.session_id(),
            cancel: cancel.clone(),
            stopped: stopped.clone(),
        };
        if !self.registry.write().await.insert(entry) {
            return Err(Error::Internal(format!("Subscription id {id} already live")));
        }
        self.hook_session(&sink);
        info!(
            subscription_id = %id,
            kind = kind.as_str(),
            session_id = %sink.session_id(),
            devices = devices.len(),
            "Subscribing"
        );

        if devices.is_empty() {
            stopped.cancel();
            return Ok(Subscribed {
                subscription_id: id,
                snapshot: None,
            });
        }

        let mut streams = Vec::with_capacity(devices.len());
        for device in &devices {
            let request = RpcRequest::new(build(id, device))
                .with_partition_key(device.as_str())
                .streaming();
            match self.rpc.call_stream(request).await {
                Ok(stream) => streams.push((device.clone(), stream)),
                Err(e) => {
                    for (_, stream) in &streams {
                        stream.handle().release().await;
                    }
                    stopped.cancel();
                    self.abort(id).await;
                    return Err(e.into());
                }
            }
        }

        let (barrier_tx, barrier_rx) = oneshot::channel();
        let pump = Pump::new(id, kind, sink, cancel, stopped, streams, barrier_tx);
        let manager = self.clone();
        tokio::spawn(async move {
            pump.run().await;
            manager.forget(id).await;
        });

        match timeout(self.subscribe_timeout, barrier_rx).await {
            Ok(Ok(Ok(snapshot))) => {
                debug!(subscription_id = %id, "Subscription acknowledged");
                Ok(Subscribed {
                    subscription_id: id,
                    snapshot,
                })
            }
            Ok(Ok(Err(e))) => {
                self.abort(id).await;
                Err(e.into())
            }
            Ok(Err(_)) => {
                self.abort(id).await;
                Err(Error::Transient(format!(
                    "Subscription {id} stopped before it was acknowledged"
                )))
            }
            Err(_) => {
                warn!(subscription_id = %id, devices = devices.len(), "Subscribe timed out");
                self.abort(id).await;
                Err(Error::Transient(format!(
                    "Timed out waiting for {} subscribe acknowledgements",
                    devices.len()
                )))
            }
        }
    }

    /// Push the unsubscribe to the backend, then drop the subscription.
    ///
    /// `device_guids` narrows which shards are told; by default every device
    /// of the subscription is. Returns only after the fan-out task has
    /// stopped, so no event reaches the session afterwards.
    pub async fn unsubscribe(
        &self,
        subscription_id: Uuid,
        device_guids: Option<BTreeSet<String>>,
    ) -> Result<()> {
        let entry = self
            .registry
            .read()
            .await
            .get(&subscription_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Subscription {subscription_id} not found")))?;
        let targets = device_guids.unwrap_or_else(|| entry.devices.clone());
        self.push_unsubscribe(&entry, &targets).await;
        self.registry.write().await.remove(&subscription_id);
        entry.cancel.cancel();
        entry.stopped.cancelled().await;
        info!(subscription_id = %subscription_id, "Unsubscribed");
        Ok(())
    }

    /// Drop every subscription owned by a session. Returns how many there were.
    pub async fn close_session(&self, session_id: Uuid) -> usize {
        self.hooked_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
        let entries = self.registry.write().await.drain_session(&session_id);
        for entry in &entries {
            self.push_unsubscribe(entry, &entry.devices).await;
            entry.cancel.cancel();
        }
        if !entries.is_empty() {
            info!(session_id = %session_id, count = entries.len(), "Session subscriptions closed");
        }
        entries.len()
    }

    pub async fn owner(&self, subscription_id: &Uuid) -> Option<Uuid> {
        self.registry
            .read()
            .await
            .get(subscription_id)
            .map(|e| e.session_id)
    }

    pub async fn kind(&self, subscription_id: &Uuid) -> Option<SubscriptionKind> {
        self.registry.read().await.get(subscription_id).map(|e| e.kind)
    }

    pub async fn contains(&self, subscription_id: &Uuid) -> bool {
        self.registry.read().await.contains(subscription_id)
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn session_subscriptions(&self, session_id: &Uuid) -> Vec<Uuid> {
        self.registry.read().await.session_subscriptions(session_id)
    }

    /// Undo a subscribe that never completed.
    async fn abort(&self, subscription_id: Uuid) {
        let entry = self.registry.write().await.remove(&subscription_id);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            self.push_unsubscribe(&entry, &entry.devices).await;
        }
    }

    /// Remove a subscription whose fan-out task ended on its own.
    async fn forget(&self, subscription_id: Uuid) {
        if let Some(entry) = self.registry.write().await.remove(&subscription_id) {
            entry.cancel.cancel();
            debug!(subscription_id = %subscription_id, "Subscription ended");
        }
    }

    async fn push_unsubscribe(&self, entry: &SubscriptionEntry, devices: &BTreeSet<String>) {
        for device in devices {
            let Some(body) = unsubscribe_body(entry.kind, entry.id, device) else {
                continue;
            };
            let request = RpcRequest::new(body).with_partition_key(device.as_str());
            if let Err(e) = self.rpc.push(request).await {
                warn!(
                    subscription_id = %entry.id,
                    device_guid = %device,
                    error = %e,
                    "Unsubscribe push failed"
                );
            }
        }
    }

    /// Arrange for the session's subscriptions to be dropped when it closes.
    fn hook_session(&self, sink: &Arc<dyn SessionSink>) {
        let session_id = sink.session_id();
        let newly_hooked = self
            .hooked_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id);
        if !newly_hooked {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(session_id = %session_id, "No runtime to watch session close");
            return;
        };
        let manager = self.clone();
        sink.on_close(Box::new(move || {
            handle.spawn(async move {
                manager.close_session(session_id).await;
            });
        }));
    }
}

fn unsubscribe_body(kind: SubscriptionKind, subscription_id: Uuid, device: &str) -> Option<RequestBody> {
    let device_guids = Some(BTreeSet::from([device.to_string()]));
    match kind {
        SubscriptionKind::Command => Some(RequestBody::CommandUnsubscribeRequest(
            CommandUnsubscribeRequest {
                subscription_id,
                device_guids,
            },
        )),
        SubscriptionKind::Notification => Some(RequestBody::NotificationUnsubscribeRequest(
            NotificationUnsubscribeRequest {
                subscription_id,
                device_guids,
            },
        )),
        SubscriptionKind::CommandUpdate => None,
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
