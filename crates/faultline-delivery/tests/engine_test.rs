//! Delivery engine behavior over scripted adapters.

use std::time::Duration;

use faultline_delivery::{DeliveryConfig, RetryPolicy};
use faultline_testing::{fixtures, MockAdapter, SendOutcome as Outcome, TestEnv};

fn fast_config() -> DeliveryConfig {
    DeliveryConfig {
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        },
        send_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test]
async fn successful_delivery_removes_item() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("sentry", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("boom"), "sentry".into()).await;

    let engine = env.engine(fast_config());
    engine.drain_once().await;

    assert_eq!(adapter.send_count(), 1);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.successful_errors, 1);
    assert_eq!(metrics.failed_errors, 0);
    assert_eq!(metrics.dropped_errors, 0);
}

#[tokio::test]
async fn transient_failures_then_success() {
    // maxRetries=2, baseDelay=100ms: two transient rejections then success.
    // Expected: retryCount 0 -> 1 -> 2, item removed after the 3rd attempt.
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    adapter.script([
        Outcome::Transient("down".into()),
        Outcome::Transient("still down".into()),
        Outcome::Success,
    ]);
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("E1"), "p".into()).await;
    let engine = env.engine(fast_config());

    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);
    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].retry_count, 1);

    // Not due yet: backoff is 100ms * 2^1 = 200ms from enqueue.
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);

    env.clock.advance(Duration::from_millis(200));
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 2);
    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items[0].retry_count, 2);

    // Third attempt due at enqueue + 400ms.
    env.clock.advance(Duration::from_millis(300));
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 3);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.successful_errors, 1);
    assert_eq!(metrics.failed_errors, 2);
    assert_eq!(metrics.dropped_errors, 0);

    // Attempt numbers the adapter observed: 1, 2, 3.
    let attempts: Vec<u32> = adapter.sends().iter().map(|(_, c)| c.attempt_number).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn rate_limited_item_waits_out_the_backend_window() {
    // The backend's retry-after guidance overrides the backoff schedule:
    // a 1-hour window holds the item long past the 200ms computed backoff.
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    adapter.script([Outcome::RateLimited(3600), Outcome::Success]);
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("E1"), "p".into()).await;
    let engine = env.engine(fast_config());

    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);
    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items.len(), 1);
    assert!(items[0].not_before.is_some());

    // Well past the computed backoff, still inside the backend's window.
    env.clock.advance(Duration::from_secs(1));
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);
    assert_eq!(env.storage.queue.stats().await.item_count, 1);

    env.clock.advance(Duration::from_secs(3600));
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 2);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.successful_errors, 1);
    assert_eq!(metrics.failed_errors, 1);
    assert_eq!(metrics.dropped_errors, 0);
}

#[tokio::test]
async fn exhausted_retries_drop_item() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    adapter.script([
        Outcome::Transient("down".into()),
        Outcome::Transient("down".into()),
        Outcome::Transient("down".into()),
    ]);
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("E1"), "p".into()).await;
    let mut config = fast_config();
    config.retry.max_retries = 2;
    let engine = env.engine(config);

    for _ in 0..3 {
        engine.drain_once().await;
        env.clock.advance(Duration::from_secs(1));
    }

    assert_eq!(adapter.send_count(), 3);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.successful_errors, 0);
    assert_eq!(metrics.failed_errors, 3);
    assert_eq!(metrics.dropped_errors, 1);
}

#[tokio::test]
async fn permanent_failure_drops_without_retry() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    adapter.script([Outcome::Permanent("bad payload".into())]);
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("E1"), "p".into()).await;
    let engine = env.engine(fast_config());
    engine.drain_once().await;

    assert_eq!(adapter.send_count(), 1);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);
    assert_eq!(env.storage.metrics.snapshot().await.dropped_errors, 1);

    // No retry is attempted even after the backoff window.
    env.clock.advance(Duration::from_secs(10));
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);
}

#[tokio::test]
async fn failing_provider_does_not_block_others() {
    let env = TestEnv::new();
    let stuck = MockAdapter::new();
    stuck.script([
        Outcome::Transient("down".into()),
        Outcome::Transient("down".into()),
        Outcome::Transient("down".into()),
    ]);
    let healthy = MockAdapter::new();
    env.install_adapter("a", stuck.clone()).await.expect("activation should succeed");
    env.install_adapter("b", healthy.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("stuck-1"), "a".into()).await;
    env.storage.queue.enqueue(fixtures::error_with_message("ok-1"), "b".into()).await;
    env.storage.queue.enqueue(fixtures::error_with_message("ok-2"), "b".into()).await;

    let engine = env.engine(fast_config());
    engine.drain_once().await;

    // Both of b's items delivered while a's item remains queued for retry.
    assert_eq!(healthy.send_count(), 2);
    let remaining = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].provider.as_str(), "a");

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.successful_errors, 2);
    assert_eq!(metrics.dropped_errors, 0);
}

#[tokio::test]
async fn unregistered_provider_items_stay_queued() {
    let env = TestEnv::new();
    env.storage.queue.enqueue(fixtures::error_with_message("orphan"), "ghost".into()).await;

    let engine = env.engine(fast_config());
    engine.drain_once().await;

    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].retry_count, 0);
    assert_eq!(env.storage.metrics.snapshot().await.failed_errors, 0);
}

#[tokio::test]
async fn registered_but_unactivated_adapter_is_skipped() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.registry.register("p".into(), std::sync::Arc::new(adapter.clone())).await;

    env.storage.queue.enqueue(fixtures::error_with_message("waiting"), "p".into()).await;
    let engine = env.engine(fast_config());
    engine.drain_once().await;

    assert_eq!(adapter.send_count(), 0);
    assert_eq!(env.storage.queue.stats().await.item_count, 1);
}

#[tokio::test]
async fn offline_suppresses_drains() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");
    env.storage.queue.enqueue(fixtures::error_with_message("held"), "p".into()).await;

    env.set_online(false);
    let engine = env.engine(fast_config());
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 0);
    assert_eq!(env.storage.queue.stats().await.item_count, 1);

    env.set_online(true);
    engine.drain_once().await;
    assert_eq!(adapter.send_count(), 1);
    assert_eq!(env.storage.queue.stats().await.item_count, 0);
}

#[tokio::test(start_paused = true)]
async fn send_timeout_counts_as_transient_failure() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    adapter.script([Outcome::Hang]);
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.storage.queue.enqueue(fixtures::error_with_message("slow"), "p".into()).await;
    let engine = env.engine(fast_config());
    engine.drain_once().await;

    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].retry_count, 1);
    assert_eq!(env.storage.metrics.snapshot().await.failed_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn background_loop_drains_on_trigger() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");
    env.storage.queue.enqueue(fixtures::error_with_message("nudge"), "p".into()).await;

    let mut engine = env.engine(fast_config());
    engine.start();
    engine.trigger_drain();

    for _ in 0..100 {
        if env.storage.queue.stats().await.item_count == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(env.storage.queue.stats().await.item_count, 0);
    assert_eq!(adapter.send_count(), 1);

    engine.shutdown().await.expect("shutdown within timeout");
}

#[tokio::test(start_paused = true)]
async fn connectivity_restored_triggers_drain() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    env.set_online(false);
    let mut engine = env.engine(DeliveryConfig {
        poll_interval: Duration::from_secs(3600),
        ..fast_config()
    });
    engine.start();

    env.storage.queue.enqueue(fixtures::error_with_message("buffered"), "p".into()).await;
    engine.trigger_drain();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.send_count(), 0, "offline drains must be suppressed");

    env.set_online(true);
    for _ in 0..100 {
        if env.storage.queue.stats().await.item_count == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(adapter.send_count(), 1);

    engine.shutdown().await.expect("shutdown within timeout");
}
