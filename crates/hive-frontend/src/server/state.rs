use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hive_core::auth::{Authenticator, DeviceDirectory, Principal, Role};
use hive_core::config::{Config, ServerConfig};
use hive_core::model::Device;
use hive_core::time::TimestampSource;
use hive_core::{Error, Result};

use crate::bus::BusRegistry;
use crate::rpc::RpcClient;
use crate::services::{CommandService, NotificationService};
use crate::subscription::SubscriptionManager;

/// Limits applied to client sessions and long polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub session_queue_depth: usize,
    pub max_wait_timeout: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            session_queue_depth: config.session_queue_depth,
            max_wait_timeout: Duration::from_secs(config.max_wait_timeout_secs),
        }
    }
}

/// Shared state handed to every HTTP and websocket handler.
#[derive(Clone)]
pub struct AppState {
    pub commands: CommandService,
    pub notifications: NotificationService,
    pub subscriptions: SubscriptionManager,
    pub bus: BusRegistry,
    pub auth: Arc<dyn Authenticator>,
    pub devices: Arc<dyn DeviceDirectory>,
    pub clock: Arc<dyn TimestampSource>,
    pub settings: ServerSettings,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services on top of `bus` using the timeouts from `config`.
    pub fn new(
        config: &Config,
        bus: BusRegistry,
        auth: Arc<dyn Authenticator>,
        devices: Arc<dyn DeviceDirectory>,
        clock: Arc<dyn TimestampSource>,
    ) -> Self {
        let rpc = RpcClient::new(
            bus.clone(),
            config.bus.request_timeout(),
            config.bus.stream_buffer,
        );
        let subscriptions = SubscriptionManager::new(rpc.clone(), config.bus.subscribe_timeout());
        Self {
            commands: CommandService::new(rpc.clone(), subscriptions.clone(), Arc::clone(&clock)),
            notifications: NotificationService::new(
                rpc,
                subscriptions.clone(),
                Arc::clone(&clock),
            ),
            subscriptions,
            bus,
            auth,
            devices,
            clock,
            settings: ServerSettings::from_config(&config.server),
            started_at: Instant::now(),
        }
    }

    /// Resolve a device the principal is allowed to act on.
    ///
    /// Unknown or invisible devices are `NotFound`. A device principal bound
    /// to another device, or a device outside any network, is `Forbidden`.
    pub fn resolve_device(&self, principal: &Principal, guid: &str) -> Result<Device> {
        if principal.role == Role::Device && principal.device.as_deref() != Some(guid) {
            return Err(Error::Forbidden(format!(
                "No access to device {guid}"
            )));
        }
        let device = self
            .devices
            .find_with_permissions(guid, principal)
            .ok_or_else(|| Error::NotFound(format!("Device with guid = {guid} not found")))?;
        if device.network_id.is_none() {
            return Err(Error::Forbidden(format!(
                "Device {guid} is not assigned to a network"
            )));
        }
        Ok(device)
    }

    /// The device set a subscription or search covers.
    ///
    /// `None` expands to every device the principal can see. An explicit set
    /// must consist of devices the principal may act on.
    pub fn device_scope(
        &self,
        principal: &Principal,
        requested: Option<BTreeSet<String>>,
    ) -> Result<BTreeSet<String>> {
        match requested {
            None => Ok(self.devices.visible_devices(principal)),
            Some(guids) => {
                for guid in &guids {
                    self.resolve_device(principal, guid)?;
                }
                Ok(guids)
            }
        }
    }
}
