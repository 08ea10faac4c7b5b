//! Principals and the collaborators that resolve them.
//!
//! Authentication itself happens upstream; the frontend only needs to turn a
//! bearer token into a [`Principal`] and check which devices it may touch.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, TokenConfig};
use crate::model::{Device, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    Key,
    Device,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub role: Role,
    pub user: Option<User>,
    /// Devices a client/key principal may see. `None` means no restriction.
    pub device_guids: Option<BTreeSet<String>>,
    /// Device a device principal is bound to.
    pub device: Option<String>,
}

impl Principal {
    pub const fn admin() -> Self {
        Self {
            role: Role::Admin,
            user: None,
            device_guids: None,
            device: None,
        }
    }

    pub fn can_access(&self, guid: &str) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Device => self.device.as_deref() == Some(guid),
            Role::Client | Role::Key => self
                .device_guids
                .as_ref()
                .is_none_or(|allowed| allowed.contains(guid)),
        }
    }
}

/// Resolves bearer tokens to principals.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Device lookup with permission filtering.
pub trait DeviceDirectory: Send + Sync {
    fn find(&self, guid: &str) -> Option<Device>;

    fn all(&self) -> Vec<Device>;

    fn find_with_permissions(&self, guid: &str, principal: &Principal) -> Option<Device> {
        if principal.can_access(guid) {
            self.find(guid)
        } else {
            None
        }
    }

    /// Every device guid the principal may see.
    fn visible_devices(&self, principal: &Principal) -> BTreeSet<String> {
        self.all()
            .into_iter()
            .filter(|d| principal.can_access(&d.guid))
            .map(|d| d.guid)
            .collect()
    }
}

/// Token table loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| (t.token.clone(), principal_from_token(t)))
            .collect();
        Self { tokens }
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }
}

fn principal_from_token(t: &TokenConfig) -> Principal {
    Principal {
        role: t.role,
        user: t.user_id.map(|id| User {
            id,
            login: t.login.clone().unwrap_or_default(),
        }),
        device_guids: t
            .device_guids
            .as_ref()
            .map(|guids| guids.iter().cloned().collect()),
        device: t.device_guid.clone(),
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

/// Device directory backed by a fixed list.
#[derive(Debug, Default)]
pub struct InMemoryDeviceDirectory {
    devices: HashMap<String, Device>,
}

impl InMemoryDeviceDirectory {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.guid.clone(), d)).collect(),
        }
    }
}

impl DeviceDirectory for InMemoryDeviceDirectory {
    fn find(&self, guid: &str) -> Option<Device> {
        self.devices.get(guid).cloned()
    }

    fn all(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }
}
