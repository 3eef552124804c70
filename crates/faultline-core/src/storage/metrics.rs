//! Persisted delivery counters.
//!
//! Counters only move forward during normal operation; `import` and `reset`
//! are the only ways to rewrite them. Persistence is best-effort like the
//! other stores.

use std::sync::Arc;

use tracing::warn;

use crate::{
    error::Result,
    models::Metrics,
    storage::kv::{self, keys, KeyValueStore},
};

/// Durable counter store for delivery accounting.
#[derive(Debug)]
pub struct MetricsStore {
    store: Arc<dyn KeyValueStore>,
    state: tokio::sync::Mutex<Metrics>,
}

impl MetricsStore {
    /// Creates a zeroed metrics store over the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, state: tokio::sync::Mutex::new(Metrics::default()) }
    }

    /// Restores persisted counters. Corrupt records reset to zero.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the backend read itself fails.
    pub async fn load(&self) -> Result<()> {
        let metrics = match kv::load_json::<Metrics>(self.store.as_ref(), keys::METRICS).await {
            Ok(metrics) => metrics.unwrap_or_default(),
            Err(crate::error::CoreError::Serialization(e)) => {
                warn!(error = %e, "discarding corrupt metrics record");
                Metrics::default()
            },
            Err(e) => return Err(e),
        };
        *self.state.lock().await = metrics;
        Ok(())
    }

    /// Counts a record accepted by the capture pipeline.
    pub async fn record_captured(&self) {
        self.bump(|m| m.total_errors += 1).await;
    }

    /// Counts a successful delivery.
    pub async fn record_success(&self) {
        self.bump(|m| m.successful_errors += 1).await;
    }

    /// Counts one failed delivery attempt.
    pub async fn record_failure(&self) {
        self.bump(|m| m.failed_errors += 1).await;
    }

    /// Counts records lost to eviction, exhausted retries, permanent
    /// rejection, or oversize rejection.
    pub async fn record_dropped(&self, count: u64) {
        if count > 0 {
            self.bump(|m| m.dropped_errors += count).await;
        }
    }

    /// Returns a copy of the current counters.
    pub async fn snapshot(&self) -> Metrics {
        *self.state.lock().await
    }

    /// Zeroes all counters.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = Metrics::default();
        self.persist(&state).await;
    }

    /// Replaces the counters wholesale. Used by import.
    pub(crate) async fn replace(&self, metrics: Metrics) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = metrics;
        kv::store_json(self.store.as_ref(), keys::METRICS, &*state).await
    }

    async fn bump(&self, update: impl FnOnce(&mut Metrics)) {
        let mut state = self.state.lock().await;
        update(&mut state);
        self.persist(&state).await;
    }

    async fn persist(&self, metrics: &Metrics) {
        if let Err(e) = kv::store_json(self.store.as_ref(), keys::METRICS, metrics).await {
            warn!(error = %e, "metrics persist failed, continuing in-memory");
        }
    }
}
