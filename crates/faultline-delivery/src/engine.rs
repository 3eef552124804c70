//! Delivery engine draining queued errors to provider adapters.
//!
//! The engine drains the persistent queue one provider lane at a time, so a
//! slow or failing backend never blocks another provider's items. Drain
//! passes are triggered three ways: a nudge from the capture pipeline after
//! enqueue, a periodic sweep, and a connectivity-restored signal. All three
//! funnel into the same idempotent pass, and a per-lane guard keeps
//! concurrent triggers from double-draining a lane.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ DeliveryEngine │──▶│ Lane Drains  │──▶│  Adapters   │
//! └────────────────┘   └──────────────┘   └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌───────────────┐    ┌──────────────┐
//! │ Queue Store   │    │ Retry Policy │
//! └───────────────┘    └──────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use faultline_core::{Clock, Provider, QueueItem, Storage};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, SendContext, SendError};
use crate::error::{DeliveryError, Result};
use crate::registry::AdapterRegistry;
use crate::retry::{RetryDecision, RetryPolicy};

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum items pulled per lane per drain iteration.
    pub batch_size: usize,

    /// Interval between periodic sweep passes.
    pub poll_interval: Duration,

    /// Per-send timeout. Expiry counts as a transient failure.
    pub send_timeout: Duration,

    /// Maximum time to wait for in-flight lanes during shutdown.
    pub shutdown_timeout: Duration,

    /// Retry policy applied to transient failures.
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    /// Builds a config from persisted runtime settings, keeping the engine
    /// timing defaults.
    pub fn from_settings(settings: &faultline_core::Settings) -> Self {
        Self { retry: RetryPolicy::from_settings(settings), ..Default::default() }
    }
}

/// Detached drain trigger handed to producers such as the capture pipeline.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    inner: std::sync::Weak<EngineInner>,
}

impl DrainHandle {
    /// Nudges the owning engine to run a drain pass soon.
    pub fn trigger(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.drain_notify.notify_one();
        }
    }
}

struct EngineInner {
    storage: Arc<Storage>,
    registry: Arc<AdapterRegistry>,
    clock: Arc<dyn Clock>,
    config: DeliveryConfig,
    drain_notify: Notify,
    online: watch::Receiver<bool>,
    active_lanes: Mutex<HashSet<Provider>>,
    lane_handles: Mutex<Vec<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

/// Delivery engine coordinating per-provider drain passes.
pub struct DeliveryEngine {
    inner: Arc<EngineInner>,
    run_handle: Option<JoinHandle<()>>,
}

impl DeliveryEngine {
    /// Creates an engine over the given storage, registry, and connectivity
    /// signal. The watch channel carries `true` while the environment
    /// reports itself online; drains are suppressed while it reads `false`
    /// and one pass fires on every offline-to-online transition.
    pub fn new(
        storage: Arc<Storage>,
        registry: Arc<AdapterRegistry>,
        clock: Arc<dyn Clock>,
        online: watch::Receiver<bool>,
        config: DeliveryConfig,
    ) -> Self {
        let inner = Arc::new(EngineInner {
            storage,
            registry,
            clock,
            config,
            drain_notify: Notify::new(),
            online,
            active_lanes: Mutex::new(HashSet::new()),
            lane_handles: Mutex::new(Vec::new()),
            cancellation_token: CancellationToken::new(),
        });
        Self { inner, run_handle: None }
    }

    /// Starts the background loop driving periodic and triggered drains.
    ///
    /// Returns immediately. Use [`shutdown`](Self::shutdown) to stop
    /// gracefully, or drop the engine to cancel outstanding work.
    pub fn start(&mut self) {
        if self.run_handle.is_some() {
            return;
        }
        info!(
            batch_size = self.inner.config.batch_size,
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "starting delivery engine"
        );
        let inner = Arc::clone(&self.inner);
        self.run_handle = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Nudges the background loop to run a drain pass soon.
    ///
    /// Cheap and safe to call from any context; concurrent nudges coalesce.
    pub fn trigger_drain(&self) {
        self.inner.drain_notify.notify_one();
    }

    /// Returns a detached handle that can trigger drains.
    ///
    /// The handle holds a weak reference; triggers after the engine is gone
    /// become no-ops.
    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle { inner: Arc::downgrade(&self.inner) }
    }

    /// Runs one complete drain pass inline, lane by lane, and waits for it.
    ///
    /// Skips the pass entirely while the connectivity signal reads offline.
    /// Intended for callers that need deterministic completion; the
    /// background loop uses the same per-lane logic concurrently.
    pub async fn drain_once(&self) {
        if !*self.inner.online.borrow() {
            debug!("drain skipped, environment offline");
            return;
        }
        let providers = self.inner.storage.queue.providers().await;
        for provider in providers {
            if self.inner.cancellation_token.is_cancelled() {
                break;
            }
            if !self.inner.claim_lane(&provider).await {
                continue;
            }
            self.inner.drain_lane(&provider).await;
            self.inner.release_lane(&provider).await;
        }
    }

    /// Gracefully shuts down the engine.
    ///
    /// Signals the background loop and in-flight lane drains to stop, then
    /// waits up to the configured shutdown timeout for them to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down delivery engine");
        self.inner.cancellation_token.cancel();

        let mut handles = Vec::new();
        if let Some(handle) = self.run_handle.take() {
            handles.push(handle);
        }
        handles.append(&mut *self.inner.lane_handles.lock().await);

        let timeout = self.inner.config.shutdown_timeout;
        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        match joined {
            Ok(_) => {
                info!("delivery engine stopped");
                Ok(())
            },
            Err(_) => Err(DeliveryError::ShutdownTimeout { elapsed_ms: timeout.as_millis() as u64 }),
        }
    }
}

impl Drop for DeliveryEngine {
    fn drop(&mut self) {
        self.inner.cancellation_token.cancel();
    }
}

impl EngineInner {
    /// Background loop: waits on the periodic timer, drain nudges, and
    /// connectivity transitions, then launches lane drains.
    async fn run(self: Arc<Self>) {
        let mut online_rx = self.online.clone();
        loop {
            tokio::select! {
                () = self.cancellation_token.cancelled() => {
                    info!("delivery loop received shutdown signal");
                    break;
                }
                () = self.drain_notify.notified() => {}
                () = tokio::time::sleep(self.config.poll_interval) => {}
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        // Connectivity source dropped; fall back to the timer.
                        continue;
                    }
                    if !*online_rx.borrow() {
                        debug!("connectivity lost, drains suppressed");
                        continue;
                    }
                    debug!("connectivity restored, draining");
                }
            }

            if !*self.online.borrow() {
                continue;
            }
            self.spawn_lane_drains().await;
        }
    }

    /// Launches one drain task per lane with queued items, skipping lanes
    /// that already have a drain in flight.
    async fn spawn_lane_drains(self: &Arc<Self>) {
        let providers = self.storage.queue.providers().await;
        let mut handles = self.lane_handles.lock().await;
        handles.retain(|h| !h.is_finished());

        for provider in providers {
            if !self.claim_lane(&provider).await {
                continue;
            }
            let inner = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                inner.drain_lane(&provider).await;
                inner.release_lane(&provider).await;
            }));
        }
    }

    async fn claim_lane(&self, provider: &Provider) -> bool {
        self.active_lanes.lock().await.insert(provider.clone())
    }

    async fn release_lane(&self, provider: &Provider) {
        self.active_lanes.lock().await.remove(provider);
    }

    /// Drains one provider lane until it has no due items or stops making
    /// progress. Items whose adapter is missing or whose backoff has not
    /// elapsed stay queued for a later pass.
    async fn drain_lane(&self, provider: &Provider) {
        let Some(adapter) = self.registry.resolve(provider).await else {
            debug!(provider = %provider, "no initialized adapter, lane left queued");
            return;
        };

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let now = self.clock.now();
            let batch = self.storage.queue.dequeue_batch(Some(provider), self.config.batch_size).await;
            let due: Vec<QueueItem> = batch.into_iter().filter(|item| self.item_is_due(item, now)).collect();
            if due.is_empty() {
                break;
            }

            let mut progressed = false;
            for item in due {
                if self.cancellation_token.is_cancelled() {
                    return;
                }
                if self.process_item(adapter.as_ref(), provider, item).await {
                    progressed = true;
                }
            }

            // Everything left is waiting out its backoff; stop looping.
            if !progressed {
                break;
            }
        }
    }

    /// Whether an item may be attempted at `now`. A backend-imposed hold
    /// (rate-limit guidance) overrides the computed backoff schedule.
    fn item_is_due(&self, item: &QueueItem, now: chrono::DateTime<chrono::Utc>) -> bool {
        match item.not_before {
            Some(not_before) => now >= not_before,
            None => self.config.retry.is_due(item.created_at, item.retry_count, now),
        }
    }

    /// Attempts delivery of one item. Returns true if the item left the
    /// queue (delivered or dropped), false if it stays for a later pass.
    async fn process_item(
        &self,
        adapter: &dyn Adapter,
        provider: &Provider,
        item: QueueItem,
    ) -> bool {
        let attempt_number = item.retry_count + 1;
        let context = SendContext {
            item_id: item.id,
            attempt_number,
            enqueued_at: item.created_at,
        };

        debug!(
            provider = %provider,
            item_id = %item.id,
            attempt_number,
            "attempting error delivery"
        );

        let send = adapter.send(&item.error, &context);
        let outcome = match tokio::time::timeout(self.config.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(SendError::transient(format!(
                "send timed out after {}ms",
                self.config.send_timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(()) => {
                self.storage.queue.remove(item.id).await;
                self.storage.metrics.record_success().await;
                info!(
                    provider = %provider,
                    item_id = %item.id,
                    attempt_number,
                    "error delivered"
                );
                true
            },
            Err(error) => {
                self.storage.metrics.record_failure().await;

                let failed_at = self.clock.now();
                let new_count = item.retry_count.saturating_add(1);
                match self.config.retry.decide(&error, new_count, item.created_at, failed_at) {
                    RetryDecision::Retry { next_attempt_at } => {
                        // Only a rate-limit carries guidance worth pinning;
                        // transient failures stay on the backoff schedule.
                        let not_before = error.retry_after_seconds().map(|_| next_attempt_at);
                        if let Err(e) = self
                            .storage
                            .queue
                            .update_retry_count(item.id, new_count, not_before)
                            .await
                        {
                            // Removed concurrently; nothing left to reschedule.
                            warn!(item_id = %item.id, error = %e, "retry bookkeeping failed");
                            return true;
                        }
                        warn!(
                            provider = %provider,
                            item_id = %item.id,
                            attempt_number,
                            next_attempt_at = %next_attempt_at,
                            error = %error,
                            "delivery failed, retry scheduled"
                        );
                        false
                    },
                    RetryDecision::GiveUp { reason } => {
                        self.storage.queue.remove(item.id).await;
                        self.storage.metrics.record_dropped(1).await;
                        warn!(
                            provider = %provider,
                            item_id = %item.id,
                            attempt_number,
                            reason = %reason,
                            error = %error,
                            "delivery abandoned, item dropped"
                        );
                        true
                    },
                }
            },
        }
    }
}
