//! Persisted runtime settings.
//!
//! Queue bounds and retry knobs survive restarts so a host that tunes them
//! at runtime gets the same behavior after relaunch. Delivery code treats
//! these as its configuration source of truth at startup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::Result,
    storage::kv::{self, keys, KeyValueStore},
};

/// Runtime settings persisted under the settings key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum pending queue items.
    pub max_queue_items: usize,
    /// Per-item serialized-size cap in bytes.
    pub max_item_bytes: usize,
    /// Maximum retries after the first delivery attempt.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_queue_items: super::queue::DEFAULT_MAX_ITEMS,
            max_item_bytes: super::queue::DEFAULT_MAX_ITEM_BYTES,
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Durable settings store.
#[derive(Debug)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    state: tokio::sync::Mutex<Settings>,
}

impl SettingsStore {
    /// Creates a settings store holding defaults.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, state: tokio::sync::Mutex::new(Settings::default()) }
    }

    /// Restores persisted settings. Corrupt records fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the backend read itself fails.
    pub async fn load(&self) -> Result<()> {
        let settings = match kv::load_json::<Settings>(self.store.as_ref(), keys::SETTINGS).await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(crate::error::CoreError::Serialization(e)) => {
                warn!(error = %e, "discarding corrupt settings record");
                Settings::default()
            },
            Err(e) => return Err(e),
        };
        *self.state.lock().await = settings;
        Ok(())
    }

    /// Returns the current settings.
    pub async fn get(&self) -> Settings {
        *self.state.lock().await
    }

    /// Replaces the settings and persists them.
    pub async fn set(&self, settings: Settings) {
        let mut state = self.state.lock().await;
        *state = settings;
        if let Err(e) = kv::store_json(self.store.as_ref(), keys::SETTINGS, &*state).await {
            warn!(error = %e, "settings persist failed, continuing in-memory");
        }
    }

    /// Replaces the settings wholesale. Used by import.
    pub(crate) async fn replace(&self, settings: Settings) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = settings;
        kv::store_json(self.store.as_ref(), keys::SETTINGS, &*state).await
    }
}
