//! Adapter registry and current-adapter selection.
//!
//! Holds every registered adapter keyed by provider name and tracks which
//! one receives newly captured errors. Registration is cheap and infallible;
//! activation runs the adapter's `initialize` and only a successful
//! activation changes the current selection. Queued items keep their
//! capture-time provider tag, so the engine resolves adapters per item
//! rather than through the current selection.

use std::collections::HashMap;
use std::sync::Arc;

use faultline_core::{Breadcrumb, Provider};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterConfig, AdapterContext};
use crate::error::{DeliveryError, Result};

#[derive(Debug)]
struct AdapterEntry {
    adapter: Arc<dyn Adapter>,
    initialized: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    adapters: HashMap<Provider, AdapterEntry>,
    current: Option<Provider>,
}

/// Registry of provider adapters with a single current selection.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    state: Mutex<RegistryState>,
}

impl AdapterRegistry {
    /// Creates an empty registry with no current adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under a provider name.
    ///
    /// Re-registering a name replaces the previous adapter and resets its
    /// initialized flag; the replacement stays invisible to the engine until
    /// the next successful activation. If the replaced adapter was current,
    /// the selection is cleared.
    pub async fn register(&self, provider: Provider, adapter: Arc<dyn Adapter>) {
        let mut state = self.state.lock().await;
        let replaced = state
            .adapters
            .insert(provider.clone(), AdapterEntry { adapter, initialized: false })
            .is_some();
        if replaced && state.current.as_ref() == Some(&provider) {
            state.current = None;
        }
        debug!(provider = %provider, replaced, "adapter registered");
    }

    /// Activates a registered adapter, making it current on success.
    ///
    /// Runs the adapter's `initialize` with the given config. On failure the
    /// previous current adapter is left unchanged and the error is surfaced;
    /// initialization is not retried automatically.
    pub async fn activate(&self, provider: &Provider, config: AdapterConfig) -> Result<()> {
        let adapter = {
            let state = self.state.lock().await;
            let entry = state
                .adapters
                .get(provider)
                .ok_or_else(|| DeliveryError::UnknownProvider(provider.clone()))?;
            Arc::clone(&entry.adapter)
        };

        // Initialize outside the lock; adapters may do network work here.
        if let Err(e) = adapter.initialize(config).await {
            warn!(provider = %provider, error = %e, "adapter activation failed");
            return Err(DeliveryError::adapter_init(provider.clone(), e.message));
        }

        let mut state = self.state.lock().await;
        if let Some(entry) = state.adapters.get_mut(provider) {
            entry.initialized = true;
        }
        state.current = Some(provider.clone());
        debug!(provider = %provider, "adapter activated");
        Ok(())
    }

    /// Returns the current provider, if an activation has succeeded.
    pub async fn current_provider(&self) -> Option<Provider> {
        self.state.lock().await.current.clone()
    }

    /// Resolves an initialized adapter for a provider.
    ///
    /// Returns `None` for unknown providers and for adapters that are
    /// registered but not yet activated; the engine leaves such items queued.
    pub async fn resolve(&self, provider: &Provider) -> Option<Arc<dyn Adapter>> {
        let state = self.state.lock().await;
        state
            .adapters
            .get(provider)
            .filter(|entry| entry.initialized)
            .map(|entry| Arc::clone(&entry.adapter))
    }

    /// Provider names with a registered adapter, in no particular order.
    pub async fn registered_providers(&self) -> Vec<Provider> {
        self.state.lock().await.adapters.keys().cloned().collect()
    }

    /// Forwards ambient context to the current adapter, best effort.
    pub async fn forward_context(&self, context: &AdapterContext) {
        let Some((provider, adapter)) = self.current_initialized().await else {
            return;
        };
        if let Err(e) = adapter.set_context(context).await {
            warn!(provider = %provider, error = %e, "adapter rejected context update");
        }
    }

    /// Forwards a breadcrumb to the current adapter, best effort.
    pub async fn forward_breadcrumb(&self, breadcrumb: &Breadcrumb) {
        let Some((provider, adapter)) = self.current_initialized().await else {
            return;
        };
        if let Err(e) = adapter.add_breadcrumb(breadcrumb).await {
            warn!(provider = %provider, error = %e, "adapter rejected breadcrumb");
        }
    }

    async fn current_initialized(&self) -> Option<(Provider, Arc<dyn Adapter>)> {
        let state = self.state.lock().await;
        let provider = state.current.clone()?;
        let entry = state.adapters.get(&provider)?;
        if !entry.initialized {
            return None;
        }
        Some((provider, Arc::clone(&entry.adapter)))
    }
}
