//! Capture pipeline: normalize, merge scope, filter, bound, enqueue.
//!
//! The pipeline is the host-facing entry point for error reports. It never
//! surfaces an error to the caller: persistence trouble degrades to
//! in-memory operation, oversized and suppressed records are dropped with a
//! log line, and delivery happens asynchronously after enqueue.

use std::sync::{Arc, RwLock};

use faultline_core::{Breadcrumb, Clock, NormalizedError, Provider, Storage, UserIdentity};
use faultline_delivery::{AdapterContext, AdapterRegistry, DrainHandle};
use tracing::{debug, warn};

use crate::normalize::{normalize, RawEvent};

/// Pre-send filter hook.
///
/// Returning `None` suppresses the record entirely: no counters move and no
/// adapter is invoked. Returning a modified record replaces the original.
pub type BeforeSend = dyn Fn(NormalizedError) -> Option<NormalizedError> + Send + Sync;

/// Capture pipeline configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Lane used when no adapter has been activated yet. Items buffered
    /// under it drain once a matching adapter comes up.
    pub default_provider: Provider,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { default_provider: Provider::from("console") }
    }
}

/// Per-capture context overrides, merged over the ambient scope.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    /// Overrides the ambient user for this record only.
    pub user: Option<UserIdentity>,
    /// Tags merged over ambient tags for this record only.
    pub tags: std::collections::BTreeMap<String, String>,
}

/// Host-facing capture entry point.
pub struct CapturePipeline {
    storage: Arc<Storage>,
    registry: Arc<AdapterRegistry>,
    clock: Arc<dyn Clock>,
    config: CaptureConfig,
    before_send: RwLock<Option<Arc<BeforeSend>>>,
    drain: RwLock<Option<DrainHandle>>,
}

impl CapturePipeline {
    /// Creates a pipeline over the given storage and registry.
    pub fn new(
        storage: Arc<Storage>,
        registry: Arc<AdapterRegistry>,
        clock: Arc<dyn Clock>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            clock,
            config,
            before_send: RwLock::new(None),
            drain: RwLock::new(None),
        }
    }

    /// Installs the pre-send filter hook, replacing any previous one.
    pub fn set_before_send(&self, filter: Arc<BeforeSend>) {
        if let Ok(mut slot) = self.before_send.write() {
            *slot = Some(filter);
        }
    }

    /// Connects the pipeline to an engine so enqueues nudge a drain pass.
    pub fn attach_engine(&self, handle: DrainHandle) {
        if let Ok(mut slot) = self.drain.write() {
            *slot = Some(handle);
        }
    }

    /// Captures a raw error report.
    ///
    /// Normalizes the event, merges the ambient scope and per-call
    /// overrides, applies the pre-send filter, enforces the per-item size
    /// cap, and enqueues the record under the current provider. Returns the
    /// enqueued record, or `None` when the filter suppressed it or it was
    /// too large. Never returns an error to the host.
    pub async fn capture(
        &self,
        event: RawEvent,
        overrides: ContextOverrides,
    ) -> Option<NormalizedError> {
        let mut error = normalize(event, self.clock.now());

        // Ambient scope first, event-derived and per-call data on top.
        let scope = self.storage.scope.snapshot().await;
        error.user = overrides.user.or_else(|| error.user.take()).or(scope.user);
        let mut tags = scope.tags;
        tags.append(&mut error.tags);
        tags.extend(overrides.tags);
        error.tags = tags;
        error.breadcrumbs = scope.breadcrumbs;

        let filter = self.before_send.read().ok().and_then(|slot| slot.clone());
        if let Some(filter) = filter {
            match filter(error) {
                Some(modified) => error = modified,
                None => {
                    debug!("record suppressed by pre-send filter");
                    return None;
                },
            }
        }

        self.storage.metrics.record_captured().await;

        let size_bytes = match serde_json::to_string(&error) {
            Ok(raw) => raw.len(),
            Err(e) => {
                warn!(error = %e, "record not serializable, dropped");
                self.storage.metrics.record_dropped(1).await;
                return None;
            },
        };
        if let Err(e) = self.storage.queue.check_item_size(size_bytes) {
            warn!(error = %e, "record exceeds size cap, dropped");
            self.storage.metrics.record_dropped(1).await;
            return None;
        }

        let provider = self
            .registry
            .current_provider()
            .await
            .unwrap_or_else(|| self.config.default_provider.clone());
        let enqueued = self.storage.queue.enqueue(error.clone(), provider).await;
        if enqueued.evicted > 0 {
            self.storage.metrics.record_dropped(enqueued.evicted as u64).await;
        }

        if let Some(handle) = self.drain.read().ok().and_then(|slot| slot.clone()) {
            handle.trigger();
        }

        Some(error)
    }

    /// Sets or clears the ambient user and forwards it to the adapter.
    ///
    /// An identity with no fields set clears the user.
    pub async fn set_user(&self, user: Option<UserIdentity>) {
        self.storage.scope.set_user(user).await;
        self.forward_scope().await;
    }

    /// Sets an ambient tag and forwards the updated context.
    pub async fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.storage.scope.set_tag(key, value).await;
        self.forward_scope().await;
    }

    /// Removes an ambient tag and forwards the updated context.
    pub async fn remove_tag(&self, key: &str) {
        self.storage.scope.remove_tag(key).await;
        self.forward_scope().await;
    }

    /// Appends a breadcrumb to the ambient trail and forwards it.
    pub async fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.storage.scope.add_breadcrumb(breadcrumb.clone()).await;
        self.registry.forward_breadcrumb(&breadcrumb).await;
    }

    /// Clears user, tags, and breadcrumbs, and forwards the empty context.
    pub async fn reset_scope(&self) {
        self.storage.scope.reset().await;
        self.forward_scope().await;
    }

    async fn forward_scope(&self) {
        let scope = self.storage.scope.snapshot().await;
        let context = AdapterContext { user: scope.user, tags: scope.tags };
        self.registry.forward_context(&context).await;
    }
}
