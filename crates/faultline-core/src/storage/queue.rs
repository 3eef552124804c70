//! Durable, bounded, ordered store of pending delivery items.
//!
//! All read-modify-write sequences go through one mutex so racing enqueue,
//! prune, and drain passes never operate on stale snapshots. Persistence is
//! best-effort: a failed write is logged and the call completes against the
//! in-memory state (degraded-durability, not data loss within the process).

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::Result,
    models::{ItemId, NormalizedError, Provider, QueueItem, QueueStats},
    storage::kv::{self, keys, KeyValueStore},
    time::Clock,
};

/// Default maximum number of pending items.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default per-item serialized-size cap in bytes (64 KiB).
pub const DEFAULT_MAX_ITEM_BYTES: usize = 64 * 1024;

/// Queue sizing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending items; the oldest are evicted past this bound.
    pub max_items: usize,
    /// Maximum serialized size of one item. Larger records are rejected at
    /// capture time, never truncated.
    pub max_item_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_items: DEFAULT_MAX_ITEMS, max_item_bytes: DEFAULT_MAX_ITEM_BYTES }
    }
}

impl QueueConfig {
    /// Builds queue bounds from persisted runtime settings.
    pub fn from_settings(settings: &crate::storage::settings::Settings) -> Self {
        Self { max_items: settings.max_queue_items, max_item_bytes: settings.max_item_bytes }
    }
}

/// Outcome of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Identifier of the newly queued item.
    pub id: ItemId,
    /// Oldest items evicted to stay within `max_items`. The caller accounts
    /// these as dropped.
    pub evicted: usize,
}

/// Persisted queue blob.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueRecord {
    items: Vec<QueueItem>,
}

/// Durable FIFO queue of pending deliveries, partitioned into per-provider
/// lanes by the `provider` tag on each item.
#[derive(Debug)]
pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    /// Single serialization point for every mutation, including its persist
    /// step. Items are kept ordered by `created_at` ascending.
    state: Mutex<Vec<QueueItem>>,
}

impl QueueStore {
    /// Creates an empty queue store over the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self { store, clock, config, state: Mutex::new(Vec::new()) }
    }

    /// Restores queued items from the persistence backend.
    ///
    /// A missing record starts empty; a corrupt record is discarded with a
    /// warning rather than poisoning startup.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the backend read itself fails.
    pub async fn load(&self) -> Result<usize> {
        let record = match kv::load_json::<QueueRecord>(self.store.as_ref(), keys::QUEUE).await {
            Ok(record) => record.unwrap_or_default(),
            Err(crate::error::CoreError::Serialization(e)) => {
                warn!(error = %e, "discarding corrupt queue record");
                QueueRecord::default()
            },
            Err(e) => return Err(e),
        };

        let mut state = self.state.lock().await;
        *state = record.items;
        state.sort_by_key(|item| item.created_at);
        debug!(restored = state.len(), "queue restored from persistence");
        Ok(state.len())
    }

    /// Enqueues an error record for the given provider lane.
    ///
    /// Never fails: the generated id is always returned and the item is
    /// queued in memory even when the persistence write is rejected (the
    /// failure is logged). Evicts oldest items past the configured bound.
    pub async fn enqueue(&self, error: NormalizedError, provider: Provider) -> Enqueued {
        let item = QueueItem {
            id: ItemId::new(),
            error,
            provider,
            retry_count: 0,
            created_at: self.clock.now(),
            not_before: None,
        };
        let id = item.id;

        let mut state = self.state.lock().await;
        state.push(item);
        // Enqueue timestamps are monotone per clock, but imported or
        // restored items may interleave.
        state.sort_by_key(|item| item.created_at);

        let mut evicted = 0;
        while state.len() > self.config.max_items {
            let victim = state.remove(0);
            evicted += 1;
            warn!(
                item_id = %victim.id,
                provider = %victim.provider,
                "queue full, evicting oldest item"
            );
        }

        self.persist(&state).await;
        Enqueued { id, evicted }
    }

    /// Returns up to `limit` pending items, oldest first.
    ///
    /// Items stay queued until [`remove`](Self::remove); a drain pass that
    /// dies mid-flight loses nothing.
    pub async fn dequeue_batch(&self, provider: Option<&Provider>, limit: usize) -> Vec<QueueItem> {
        let state = self.state.lock().await;
        state
            .iter()
            .filter(|item| provider.map_or(true, |p| &item.provider == p))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Removes a delivered or abandoned item. Returns whether it was present.
    pub async fn remove(&self, id: ItemId) -> bool {
        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|item| item.id != id);
        let removed = state.len() < before;
        if removed {
            self.persist(&state).await;
        }
        removed
    }

    /// Records a failed attempt by raising the item's retry count.
    ///
    /// Retry counts are monotonic: an update below the current value is
    /// ignored, so overlapping drain passes cannot rewind backoff. An
    /// accepted update also replaces the item's `not_before` hold:
    /// rate-limited attempts store the backend's earliest-next-attempt time,
    /// other failures clear it back to the computed backoff schedule.
    pub async fn update_retry_count(
        &self,
        id: ItemId,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = state
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| crate::error::CoreError::not_found(format!("queue item {id}")))?;

        if retry_count > item.retry_count {
            item.retry_count = retry_count;
            item.not_before = not_before;
            self.persist(&state).await;
        }
        Ok(())
    }

    /// Removes items older than `max_age`. Returns how many were removed.
    pub async fn prune_older_than(&self, max_age: Duration) -> usize {
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::max_value());

        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|item| item.created_at >= cutoff);
        let pruned = before - state.len();
        if pruned > 0 {
            debug!(pruned, "pruned stale queue items");
            self.persist(&state).await;
        }
        pruned
    }

    /// Removes all items, or all items in one provider lane.
    pub async fn clear(&self, provider: Option<&Provider>) -> usize {
        let mut state = self.state.lock().await;
        let before = state.len();
        match provider {
            Some(p) => state.retain(|item| &item.provider != p),
            None => state.clear(),
        }
        let cleared = before - state.len();
        if cleared > 0 {
            self.persist(&state).await;
        }
        cleared
    }

    /// Returns a point-in-time view of the queue.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let byte_size = serde_json::to_string(&QueueRecord { items: state.clone() })
            .map(|raw| raw.len())
            .unwrap_or(0);
        QueueStats {
            item_count: state.len(),
            byte_size,
            oldest_timestamp: state.first().map(|item| item.created_at),
        }
    }

    /// Returns the distinct provider lanes with pending items.
    pub async fn providers(&self) -> Vec<Provider> {
        let state = self.state.lock().await;
        let mut providers: Vec<Provider> = Vec::new();
        for item in state.iter() {
            if !providers.contains(&item.provider) {
                providers.push(item.provider.clone());
            }
        }
        providers
    }

    /// Validates a serialized record size against the per-item cap.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadTooLarge`](crate::error::CoreError::PayloadTooLarge)
    /// when the record exceeds the cap. Oversized records are rejected
    /// whole, never truncated.
    pub fn check_item_size(&self, size_bytes: usize) -> Result<()> {
        if size_bytes > self.config.max_item_bytes {
            return Err(crate::error::CoreError::PayloadTooLarge {
                size_bytes,
                max_bytes: self.config.max_item_bytes,
            });
        }
        Ok(())
    }

    /// Replaces the queue contents wholesale. Used by import.
    pub(crate) async fn replace_all(&self, mut items: Vec<QueueItem>) -> Result<()> {
        items.sort_by_key(|item| item.created_at);
        let mut state = self.state.lock().await;
        *state = items;
        kv::store_json(self.store.as_ref(), keys::QUEUE, &QueueRecord { items: state.clone() })
            .await
    }

    /// Snapshot of every queued item, oldest first. Used by export.
    pub(crate) async fn snapshot(&self) -> Vec<QueueItem> {
        self.state.lock().await.clone()
    }

    /// Best-effort persist of the current state; failures degrade the call
    /// to in-memory-only, logged rather than surfaced to the enqueuer.
    async fn persist(&self, items: &[QueueItem]) {
        let record = QueueRecord { items: items.to_vec() };
        if let Err(e) = kv::store_json(self.store.as_ref(), keys::QUEUE, &record).await {
            warn!(error = %e, "queue persist failed, continuing in-memory");
        }
    }
}
