//! Test infrastructure for deterministic Faultline testing.
//!
//! Provides a wired test environment over the in-memory backend, a
//! scriptable mock adapter, a fault-injecting key-value store, and fixture
//! builders for normalized errors.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use faultline_core::{Clock, Provider, QueueConfig, Storage, TestClock};
use faultline_delivery::{
    AdapterConfig, AdapterRegistry, DeliveryConfig, DeliveryEngine, Result,
};
use tokio::sync::watch;

pub mod adapters;
pub mod fixtures;
pub mod kv;

pub use adapters::{MockAdapter, SendOutcome};
pub use kv::FlakyStore;

/// Wired test environment: flaky backend, test clock, storage, registry,
/// and a controllable connectivity signal.
pub struct TestEnv {
    /// Deterministic clock shared with the storage layer.
    pub clock: Arc<TestClock>,
    /// Backing store with on-demand fault injection.
    pub store: FlakyStore,
    /// Storage aggregate over the backing store.
    pub storage: Arc<Storage>,
    /// Adapter registry under test.
    pub registry: Arc<AdapterRegistry>,
    online_tx: watch::Sender<bool>,
    online_rx: watch::Receiver<bool>,
}

impl TestEnv {
    /// Creates an environment with default queue bounds, starting online.
    pub fn new() -> Self {
        Self::with_queue_config(QueueConfig::default())
    }

    /// Creates an environment with explicit queue bounds.
    pub fn with_queue_config(config: QueueConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,faultline=debug")),
            )
            .with_test_writer()
            .try_init();

        let clock = Arc::new(TestClock::new());
        let store = FlakyStore::new();
        let storage = Arc::new(Storage::new(
            Arc::new(store.clone()),
            clock.clone() as Arc<dyn Clock>,
            config,
        ));
        let registry = Arc::new(AdapterRegistry::new());
        let (online_tx, online_rx) = watch::channel(true);
        Self { clock, store, storage, registry, online_tx, online_rx }
    }

    /// Builds a delivery engine over this environment's storage and registry.
    pub fn engine(&self, config: DeliveryConfig) -> DeliveryEngine {
        DeliveryEngine::new(
            self.storage.clone(),
            self.registry.clone(),
            self.clock.clone() as Arc<dyn Clock>,
            self.online_rx.clone(),
            config,
        )
    }

    /// Registers and activates a mock adapter under the given provider name.
    ///
    /// # Errors
    ///
    /// Propagates activation failure when the mock is scripted to reject
    /// initialization.
    pub async fn install_adapter(&self, provider: &str, adapter: MockAdapter) -> Result<()> {
        let provider = Provider::from(provider);
        self.registry.register(provider.clone(), Arc::new(adapter)).await;
        self.registry.activate(&provider, AdapterConfig::default()).await
    }

    /// Flips the connectivity signal observed by engines built from this env.
    pub fn set_online(&self, online: bool) {
        // Receivers outlive the env; send only fails with none left.
        let _ = self.online_tx.send(online);
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
