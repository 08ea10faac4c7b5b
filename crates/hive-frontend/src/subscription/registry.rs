//! Bookkeeping of live subscriptions, indexed by id and by owning session.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Command,
    Notification,
    CommandUpdate,
}

impl SubscriptionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Notification => "notification",
            Self::CommandUpdate => "command_update",
        }
    }
}

/// One live subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub id: Uuid,
    pub kind: SubscriptionKind,
    pub devices: BTreeSet<String>,
    pub names: Option<BTreeSet<String>>,
    pub session_id: Uuid,
    /// Stops the fan-out task; cancelling twice is harmless.
    pub cancel: CancellationToken,
    /// Fires once the fan-out task has exited and can deliver nothing more.
    pub stopped: CancellationToken,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<Uuid, SubscriptionEntry>,
    by_session: HashMap<Uuid, HashSet<Uuid>>,
}

impl SubscriptionRegistry {
    /// Add an entry. Refuses an id that is already live.
    pub fn insert(&mut self, entry: SubscriptionEntry) -> bool {
        if self.entries.contains_key(&entry.id) {
            return false;
        }
        self.by_session
            .entry(entry.session_id)
            .or_default()
            .insert(entry.id);
        self.entries.insert(entry.id, entry);
        true
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<SubscriptionEntry> {
        let entry = self.entries.remove(id)?;
        if let Some(ids) = self.by_session.get_mut(&entry.session_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_session.remove(&entry.session_id);
            }
        }
        Some(entry)
    }

    pub fn get(&self, id: &Uuid) -> Option<&SubscriptionEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return every subscription owned by `session_id`.
    pub fn drain_session(&mut self, session_id: &Uuid) -> Vec<SubscriptionEntry> {
        let Some(ids) = self.by_session.remove(session_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.entries.remove(id)).collect()
    }

    pub fn session_subscriptions(&self, session_id: &Uuid) -> Vec<Uuid> {
        self.by_session
            .get(session_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
