//! Live-tunable configuration registry.
//!
//! Holds the named parameters that may change while the engine is running
//! (GPU routing threshold, device list, enable flag). Components that cache
//! a value subscribe to its key and re-read on change; the subscription is a
//! RAII handle so a dropped component can never leave a dangling observer
//! registration behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::QuiverError;

/// Well-known registry keys.
pub mod keys {
    pub const GPU_ENABLE: &str = "gpu.enable";
    pub const GPU_SEARCH_THRESHOLD: &str = "gpu.search_threshold";
    pub const GPU_SEARCH_DEVICES: &str = "gpu.search_devices";
}

/// A typed, live-mutable parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    IntList(Vec<u32>),
    Text(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[u32]> {
        match self {
            ConfigValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Receives change notifications for subscribed keys.
///
/// The callback runs synchronously on the thread that called
/// [`ConfigRegistry::set`] and must re-read the value through the registry;
/// only the key name is delivered. A callback must not call `set` for the
/// key it is being notified about.
pub trait ConfigObserver: Send + Sync {
    fn config_update(&self, key: &str);
}

struct ObserverEntry {
    id: u64,
    observer: Weak<dyn ConfigObserver>,
}

struct RegistryInner {
    /// Registered values, in registration order.
    values: RwLock<IndexMap<String, ConfigValue>>,
    /// Per-key observer lists. Entries hold weak references; dead entries
    /// are pruned on notify and on subscribe.
    observers: Mutex<HashMap<String, Vec<ObserverEntry>>>,
    next_id: AtomicU64,
}

/// Cheap cloneable handle to the process-wide registry.
#[derive(Clone)]
pub struct ConfigRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                values: RwLock::new(IndexMap::new()),
                observers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a key with its initial value. Called at process start;
    /// re-registering replaces the value without notifying observers.
    pub fn register(&self, key: &str, value: ConfigValue) {
        let mut values = self.inner.values.write().unwrap();
        if values.insert(key.to_string(), value).is_some() {
            warn!(key, "config key re-registered, previous value replaced");
        } else {
            debug!(key, "config key registered");
        }
    }

    /// Current value for `key`.
    pub fn get(&self, key: &str) -> Result<ConfigValue, QuiverError> {
        self.inner
            .values
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| QuiverError::ConfigKeyMissing(key.to_string()))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, QuiverError> {
        self.get(key)?
            .as_bool()
            .ok_or_else(|| QuiverError::ConfigTypeMismatch { key: key.to_string(), expected: "bool" })
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, QuiverError> {
        self.get(key)?
            .as_i64()
            .ok_or_else(|| QuiverError::ConfigTypeMismatch { key: key.to_string(), expected: "int" })
    }

    pub fn get_int_list(&self, key: &str) -> Result<Vec<u32>, QuiverError> {
        self.get(key)?
            .as_int_list()
            .map(|v| v.to_vec())
            .ok_or_else(|| QuiverError::ConfigTypeMismatch {
                key: key.to_string(),
                expected: "int list",
            })
    }

    /// Update a registered key, then synchronously notify its subscribers
    /// with the key name. The value lock is released before any callback
    /// runs, so readers only ever wait for the store itself.
    pub fn set(&self, key: &str, value: ConfigValue) -> Result<(), QuiverError> {
        {
            let mut values = self.inner.values.write().unwrap();
            match values.get_mut(key) {
                Some(slot) => *slot = value,
                None => return Err(QuiverError::ConfigKeyMissing(key.to_string())),
            }
        }
        debug!(key, "config value updated");
        self.notify(key);
        Ok(())
    }

    /// Subscribe `observer` to changes of `key`.
    ///
    /// Returns a [`ConfigSubscription`] whose drop detaches the observer.
    /// Subscribing the same observer to the same key again replaces the
    /// earlier registration, so a key change notifies it exactly once.
    pub fn subscribe(
        &self,
        key: &str,
        observer: &Arc<dyn ConfigObserver>,
    ) -> Result<ConfigSubscription, QuiverError> {
        if !self.inner.values.read().unwrap().contains_key(key) {
            return Err(QuiverError::ConfigKeyMissing(key.to_string()));
        }

        let weak = Arc::downgrade(observer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut observers = self.inner.observers.lock().unwrap();
        let entries = observers.entry(key.to_string()).or_default();
        entries.retain(|e| {
            e.observer.strong_count() > 0 && !e.observer.ptr_eq(&weak)
        });
        entries.push(ObserverEntry { id, observer: weak });
        debug!(key, subscribers = entries.len(), "config observer subscribed");

        Ok(ConfigSubscription {
            registry: Arc::downgrade(&self.inner),
            key: key.to_string(),
            id,
        })
    }

    /// Number of live subscribers for `key` (diagnostics and tests).
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap()
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.observer.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }

    fn notify(&self, key: &str) {
        // Snapshot live observers and release the lock before running
        // callbacks: a callback may re-enter the registry for other keys.
        let live: Vec<Arc<dyn ConfigObserver>> = {
            let mut observers = self.inner.observers.lock().unwrap();
            match observers.get_mut(key) {
                Some(entries) => {
                    entries.retain(|e| e.observer.strong_count() > 0);
                    entries
                        .iter()
                        .filter_map(|e| e.observer.upgrade())
                        .collect()
                }
                None => return,
            }
        };

        for observer in live {
            observer.config_update(key);
        }
    }

    fn detach(inner: &Arc<RegistryInner>, key: &str, id: u64) {
        let mut observers = inner.observers.lock().unwrap();
        if let Some(entries) = observers.get_mut(key) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                observers.remove(key);
            }
        }
    }
}

/// RAII subscription handle. Dropping it detaches the observer; detaching an
/// already-replaced registration is a no-op.
pub struct ConfigSubscription {
    registry: Weak<RegistryInner>,
    key: String,
    id: u64,
}

impl ConfigSubscription {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ConfigSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            ConfigRegistry::detach(&inner, &self.key, self.id);
        }
    }
}

impl std::fmt::Debug for ConfigSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSubscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
