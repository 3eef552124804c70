//! Durable stores over the host-supplied key-value backend.
//!
//! Four independent records live under fixed, versioned keys: the pending
//! queue, the ambient scope, runtime settings, and delivery counters. The
//! [`Storage`] aggregate wires them to one backend and supports whole-state
//! export/import for diagnostics and migration.

pub mod kv;
pub mod metrics;
pub mod queue;
pub mod scope;
pub mod settings;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{Breadcrumb, Metrics, QueueItem, UserIdentity},
    time::Clock,
};
pub use kv::{KeyValueStore, MemoryStore};
pub use metrics::MetricsStore;
pub use queue::{Enqueued, QueueConfig, QueueStore};
pub use scope::{ScopeSnapshot, ScopeStore};
pub use settings::{Settings, SettingsStore};

/// Aggregate of all durable stores over one backend.
#[derive(Debug)]
pub struct Storage {
    /// Pending delivery queue.
    pub queue: QueueStore,
    /// Ambient user/tag/breadcrumb scope.
    pub scope: ScopeStore,
    /// Delivery counters.
    pub metrics: MetricsStore,
    /// Runtime settings.
    pub settings: SettingsStore,
}

/// Whole-state snapshot for diagnostics and migration.
///
/// `export` followed by `import` on a fresh store reproduces the queue,
/// scope, settings, and metrics exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    /// Export format version.
    pub version: u32,
    /// Queued items, oldest first.
    pub queue: Vec<QueueItem>,
    /// Active user, if any.
    pub user: Option<UserIdentity>,
    /// Ambient tags.
    pub tags: BTreeMap<String, String>,
    /// Breadcrumb trail, oldest first.
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Runtime settings.
    pub settings: Settings,
    /// Counters.
    pub metrics: Metrics,
}

/// Current export format version.
pub const EXPORT_VERSION: u32 = 1;

impl Storage {
    /// Creates the aggregate over one backend with the given queue bounds.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            queue: QueueStore::new(store.clone(), clock, config),
            scope: ScopeStore::new(store.clone(), scope::DEFAULT_MAX_BREADCRUMBS),
            metrics: MetricsStore::new(store.clone()),
            settings: SettingsStore::new(store),
        }
    }

    /// Restores all four records from the backend.
    ///
    /// # Errors
    ///
    /// Propagates backend read failures; corrupt individual records degrade
    /// to their empty state instead of failing startup.
    pub async fn load(&self) -> Result<()> {
        self.queue.load().await?;
        self.scope.load().await?;
        self.metrics.load().await?;
        self.settings.load().await?;
        Ok(())
    }

    /// Exports the full persisted state.
    pub async fn export(&self) -> ExportData {
        let scope = self.scope.snapshot().await;
        ExportData {
            version: EXPORT_VERSION,
            queue: self.queue.snapshot().await,
            user: scope.user,
            tags: scope.tags,
            breadcrumbs: scope.breadcrumbs,
            settings: self.settings.get().await,
            metrics: self.metrics.snapshot().await,
        }
    }

    /// Replaces the full persisted state with an exported snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first persistence failure; earlier records may already
    /// have been replaced.
    pub async fn import(&self, data: ExportData) -> Result<()> {
        self.queue.replace_all(data.queue).await?;
        self.scope
            .replace(ScopeSnapshot {
                user: data.user,
                tags: data.tags,
                breadcrumbs: data.breadcrumbs,
            })
            .await?;
        self.settings.replace(data.settings).await?;
        self.metrics.replace(data.metrics).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TestClock;

    #[tokio::test]
    async fn aggregate_load_of_empty_backend_succeeds() {
        let storage = Storage::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TestClock::new()),
            QueueConfig::default(),
        );
        storage.load().await.expect("empty backend should load cleanly");
        assert_eq!(storage.queue.stats().await.item_count, 0);
    }
}
