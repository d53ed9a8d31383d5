use anyhow::{Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(feature = "rocksdb")]
mod rocks;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

/// Raw string storage, the shape of browser `localStorage`/`sessionStorage`.
pub trait KeyedStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;
    fn set_raw(&self, key: &str, value: &str) -> Result<()>;
    fn remove_raw(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyedStore for InMemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Survives restarts and is shared by every tab.
    Durable,
    /// Lives for one browser session and is private to it.
    Session,
}

/// Identifies the tab (or process) that produced a storage change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(pub String);

impl TabId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Changes reported by the platform carry no tab identity.
    pub fn remote() -> Self {
        Self("remote".to_owned())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// `None` means any key may have changed.
    pub key: Option<String>,
    pub scope: StorageScope,
    pub origin: TabId,
}

impl StorageChange {
    pub fn everything(scope: StorageScope, origin: TabId) -> Self {
        Self {
            key: None,
            scope,
            origin,
        }
    }

    pub fn touches_prefix(&self, prefix: &str) -> bool {
        match &self.key {
            Some(key) => key.starts_with(prefix),
            None => true,
        }
    }
}

/// Fan-out of storage changes between tabs sharing one durable store.
#[derive(Clone)]
pub struct StorageBus {
    sender: broadcast::Sender<StorageChange>,
}

impl StorageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, change: StorageChange) {
        // No subscribers is not an error: nobody else is looking.
        let _ = self.sender.send(change);
    }

    /// Changes made by anyone except `origin`.
    pub fn foreign_changes(&self, origin: TabId) -> ForeignChanges {
        ForeignChanges {
            receiver: self.sender.subscribe(),
            origin,
        }
    }
}

impl Default for StorageBus {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct ForeignChanges {
    receiver: broadcast::Receiver<StorageChange>,
    origin: TabId,
}

impl ForeignChanges {
    /// Wait for the next foreign change. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.origin == self.origin => continue,
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage change observer lagged, forcing full resync");
                    return Some(StorageChange::everything(StorageScope::Durable, TabId::remote()));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`ForeignChanges::recv`].
    pub fn try_recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) if change.origin == self.origin => continue,
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage change observer lagged, forcing full resync");
                    return Some(StorageChange::everything(StorageScope::Durable, TabId::remote()));
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Typed JSON access over a [`KeyedStore`].
///
/// Reads never fail: missing or malformed values come back as the caller's
/// fallback. Writes are best effort and announce themselves on the bus.
pub struct LocalStore {
    backend: Arc<dyn KeyedStore>,
    scope: StorageScope,
    origin: TabId,
    bus: Option<StorageBus>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyedStore>, scope: StorageScope, origin: TabId) -> Self {
        Self {
            backend,
            scope,
            origin,
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: StorageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn scope(&self) -> StorageScope {
        self.scope
    }

    pub fn origin(&self) -> &TabId {
        &self.origin
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.backend.get_raw(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key, error = %err, "malformed stored value, using fallback");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(err) => {
                warn!(key, error = %err, "storage read failed, using fallback");
                fallback
            }
        }
    }

    pub fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.read(key, T::default())
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.backend.get_raw(key), Ok(Some(_)))
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "failed to encode value for storage");
                return;
            }
        };

        if let Err(err) = self.backend.set_raw(key, &raw) {
            warn!(key, error = %err, "storage write failed");
        } else {
            debug!(key, scope = ?self.scope, "stored value");
        }
        self.announce(key);
    }

    pub fn remove(&self, key: &str) {
        if let Err(err) = self.backend.remove_raw(key) {
            warn!(key, error = %err, "storage remove failed");
        }
        self.announce(key);
    }

    /// Changes to this store's backend made by other tabs.
    pub fn foreign_changes(&self) -> Option<ForeignChanges> {
        self.bus
            .as_ref()
            .map(|bus| bus.foreign_changes(self.origin.clone()))
    }

    fn announce(&self, key: &str) {
        if let Some(bus) = &self.bus {
            bus.publish(StorageChange {
                key: Some(key.to_owned()),
                scope: self.scope,
                origin: self.origin.clone(),
            });
        }
    }
}
