//! Key-value persistence capability.
//!
//! The host application supplies the durable backend (browser storage, a
//! file, a mobile keychain, ...) as an object exposing async get/set/remove
//! by string key. Faultline serializes its four records as opaque JSON blobs
//! under fixed, versioned keys.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// Fixed, versioned keys for the persisted records.
pub mod keys {
    /// Pending delivery queue.
    pub const QUEUE: &str = "faultline.v1.queue";
    /// Ambient user/tag/breadcrumb scope.
    pub const SCOPE: &str = "faultline.v1.scope";
    /// Runtime settings.
    pub const SETTINGS: &str = "faultline.v1.settings";
    /// Delivery counters.
    pub const METRICS: &str = "faultline.v1.metrics";
}

/// Asynchronous key-value persistence backend.
///
/// Implementations must serialize concurrent calls on the same key or
/// tolerate them; Faultline additionally funnels every read-modify-write
/// sequence through a single lock per record, so backends only see whole
///-value get/set/remove operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the value stored under `key`. Removing a missing key is not
    /// an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory reference implementation.
///
/// Used as the default backend in tests and in hosts that opt out of
/// durability. Survives for the process lifetime only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no keys are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Reads and decodes a persisted JSON record.
///
/// Returns `Ok(None)` when the key is absent. Decoding failures surface as
/// [`Serialization`](crate::error::CoreError::Serialization) errors so
/// callers can choose to start fresh.
pub async fn load_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON record.
pub async fn store_json<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
