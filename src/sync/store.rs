//! # Key-Value Store Module
//!
//! The sync layer talks to a hierarchical pub/sub key-value store through
//! the [`KvStore`] trait. Keys are `/`-separated paths, values are JSON.
//!
//! All trait methods are non-blocking: they enqueue the operation and
//! return. Delivery to watchers happens through an unbounded channel drained
//! by the subscriber's own task.
//!
//! ## Presence
//!
//! [`KvStore::watch`] optionally takes a [`PresenceClaim`]. The claim value
//! is written and a removal of the claim key is registered to run when the
//! connection drops, both in the same operation as the watch itself.
//!
//! ## In-Memory Store
//!
//! [`MemoryStore`] is a shared in-process store. Each participant opens its
//! own [`MemoryConnection`]; dropping or disconnecting it runs the
//! connection's cleanups exactly as a broker would on a lost session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{AirBridgeError, Result};

/// Store values are plain JSON.
pub type Value = serde_json::Value;

/// Value written on watch and removed when the watching connection drops.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceClaim {
    pub key: String,
    pub value: Value,
}

impl PresenceClaim {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Handle identifying one registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A registered watch and its delivery channel.
///
/// The current value (if any) is delivered first, followed by every later
/// write in order. A removal is delivered as `Value::Null`.
#[derive(Debug)]
pub struct Watch {
    pub id: WatchId,
    pub receiver: mpsc::UnboundedReceiver<Value>,
}

/// Pub/sub key-value store.
pub trait KvStore: Send + Sync {
    /// Writes `value` at `key` and notifies its watchers.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the store cannot accept writes.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removes `key`. Watchers receive `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the store cannot accept writes.
    fn remove(&self, key: &str) -> Result<()>;

    /// Registers a watch on `key`, optionally claiming presence.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the watch cannot be registered.
    fn watch(&self, key: &str, presence: Option<PresenceClaim>) -> Result<Watch>;

    /// Removes a watch. Nothing is delivered to it afterwards.
    fn unwatch(&self, id: WatchId);
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn watch(&self, key: &str, presence: Option<PresenceClaim>) -> Result<Watch> {
        (**self).watch(key, presence)
    }

    fn unwatch(&self, id: WatchId) {
        (**self).unwatch(id)
    }
}

#[derive(Debug)]
struct Watcher {
    id: WatchId,
    connection: u64,
    key: String,
    sender: mpsc::UnboundedSender<Value>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    watchers: Vec<Watcher>,
    cleanups: HashMap<u64, Vec<String>>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn write(&mut self, key: &str, value: Value) {
        if value.is_null() {
            if self.values.remove(key).is_none() {
                return;
            }
        } else {
            self.values.insert(key.to_string(), value.clone());
        }

        self.watchers.retain(|watcher| {
            if watcher.key != key {
                return true;
            }
            // A closed receiver means the subscriber is gone
            watcher.sender.send(value.clone()).is_ok()
        });
    }
}

/// Shared in-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection to this store.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::{KvStore, MemoryStore};
    /// use serde_json::json;
    ///
    /// let store = MemoryStore::new();
    /// let conn = store.connect();
    /// conn.set("rooms/AB12/status", json!({"status": "waiting"}))?;
    /// assert!(store.get("rooms/AB12/status").is_some());
    /// # Ok::<(), air_bridge::error::AirBridgeError>(())
    /// ```
    #[must_use]
    pub fn connect(&self) -> MemoryConnection {
        let id = self.lock().next_id();
        debug!("Memory store connection {} opened", id);
        MemoryConnection {
            id,
            store: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Reads the current value at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Number of live watches on `key`.
    #[must_use]
    pub fn watcher_count(&self, key: &str) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|watcher| watcher.key == key)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One participant's session on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    store: MemoryStore,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Returns the store this connection belongs to.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Returns true once the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the connection, running its disconnect cleanups and dropping
    /// its watches. Calling it again has no effect.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut inner = self.store.lock();
        inner.watchers.retain(|watcher| watcher.connection != self.id);
        let cleanups = inner.cleanups.remove(&self.id).unwrap_or_default();
        for key in &cleanups {
            debug!("Connection {} closed, removing {}", self.id, key);
            inner.write(key, Value::Null);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AirBridgeError::TransportUnavailable(
                "memory store connection closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl KvStore for MemoryConnection {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_open()?;
        self.store.lock().write(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.store.lock().write(key, Value::Null);
        Ok(())
    }

    fn watch(&self, key: &str, presence: Option<PresenceClaim>) -> Result<Watch> {
        self.ensure_open()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut inner = self.store.lock();
        if let Some(claim) = presence {
            inner.write(&claim.key, claim.value);
            let keys = inner.cleanups.entry(self.id).or_default();
            if !keys.contains(&claim.key) {
                keys.push(claim.key);
            }
        }

        if let Some(current) = inner.values.get(key) {
            // Receiver is alive in this scope
            let _ = sender.send(current.clone());
        }

        let id = WatchId(inner.next_id());
        inner.watchers.push(Watcher {
            id,
            connection: self.id,
            key: key.to_string(),
            sender,
        });

        Ok(Watch { id, receiver })
    }

    fn unwatch(&self, id: WatchId) {
        self.store.lock().watchers.retain(|watcher| watcher.id != id);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
