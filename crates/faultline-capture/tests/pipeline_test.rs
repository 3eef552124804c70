//! Capture pipeline behavior: scope merge, filtering, caps, accounting.

use std::sync::Arc;

use faultline_capture::{CaptureConfig, CapturePipeline, ContextOverrides, RawEvent};
use faultline_core::{Clock, QueueConfig};
use faultline_testing::{fixtures, MockAdapter, TestEnv};

fn pipeline(env: &TestEnv) -> CapturePipeline {
    CapturePipeline::new(
        env.storage.clone(),
        env.registry.clone(),
        env.clock.clone() as Arc<dyn Clock>,
        CaptureConfig::default(),
    )
}

#[tokio::test]
async fn capture_merges_ambient_scope() {
    let env = TestEnv::new();
    let pipeline = pipeline(&env);

    pipeline.set_user(Some(fixtures::user("u-7", "grace@example.com"))).await;
    pipeline.set_tag("release", "2.0.1").await;
    pipeline.add_breadcrumb(fixtures::breadcrumb("http", "GET /health")).await;

    let captured = pipeline
        .capture(RawEvent::message("disk full"), ContextOverrides::default())
        .await
        .expect("record should be enqueued");

    assert_eq!(captured.user.as_ref().and_then(|u| u.id.as_deref()), Some("u-7"));
    assert_eq!(captured.tags.get("release").map(String::as_str), Some("2.0.1"));
    assert_eq!(captured.breadcrumbs.len(), 1);

    assert_eq!(env.storage.metrics.snapshot().await.total_errors, 1);
    assert_eq!(env.storage.queue.stats().await.item_count, 1);
}

#[tokio::test]
async fn capture_without_active_adapter_uses_default_lane() {
    let env = TestEnv::new();
    let pipeline = pipeline(&env);

    pipeline.capture(RawEvent::message("early boot failure"), ContextOverrides::default()).await;

    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].provider.as_str(), "console");
}

#[tokio::test]
async fn capture_tags_items_with_current_provider() {
    let env = TestEnv::new();
    env.install_adapter("raygun", MockAdapter::new()).await.expect("activation should succeed");
    let pipeline = pipeline(&env);

    pipeline.capture(RawEvent::message("boom"), ContextOverrides::default()).await;

    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items[0].provider.as_str(), "raygun");
}

#[tokio::test]
async fn filter_veto_moves_no_counters() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");
    let pipeline = pipeline(&env);
    pipeline.set_before_send(Arc::new(|_| None));

    let result = pipeline.capture(RawEvent::message("secret"), ContextOverrides::default()).await;

    assert!(result.is_none());
    assert_eq!(env.storage.queue.stats().await.item_count, 0);
    assert_eq!(adapter.send_count(), 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.total_errors, 0);
    assert_eq!(metrics.dropped_errors, 0);
}

#[tokio::test]
async fn filter_may_replace_the_record() {
    let env = TestEnv::new();
    let pipeline = pipeline(&env);
    pipeline.set_before_send(Arc::new(|mut error| {
        error.message = "[redacted]".to_string();
        Some(error)
    }));

    let captured = pipeline
        .capture(RawEvent::message("password=hunter2"), ContextOverrides::default())
        .await
        .expect("record should be enqueued");

    assert_eq!(captured.message, "[redacted]");
    let items = env.storage.queue.dequeue_batch(None, 10).await;
    assert_eq!(items[0].error.message, "[redacted]");
}

#[tokio::test]
async fn oversized_record_is_dropped_with_accounting() {
    let env = TestEnv::with_queue_config(QueueConfig { max_items: 100, max_item_bytes: 256 });
    let pipeline = pipeline(&env);

    let result = pipeline
        .capture(RawEvent::message("x".repeat(1024)), ContextOverrides::default())
        .await;

    assert!(result.is_none());
    assert_eq!(env.storage.queue.stats().await.item_count, 0);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.total_errors, 1);
    assert_eq!(metrics.dropped_errors, 1);
}

#[tokio::test]
async fn queue_overflow_evicts_oldest_and_counts_drop() {
    // Queue max 2: capturing E1, E2, E3 leaves [E2, E3] and one drop.
    let env = TestEnv::with_queue_config(QueueConfig { max_items: 2, ..Default::default() });
    let pipeline = pipeline(&env);

    for message in ["E1", "E2", "E3"] {
        pipeline.capture(RawEvent::message(message), ContextOverrides::default()).await;
        env.clock.advance(std::time::Duration::from_millis(1));
    }

    let items = env.storage.queue.dequeue_batch(None, 10).await;
    let messages: Vec<&str> = items.iter().map(|i| i.error.message.as_str()).collect();
    assert_eq!(messages, vec!["E2", "E3"]);

    let metrics = env.storage.metrics.snapshot().await;
    assert_eq!(metrics.total_errors, 3);
    assert_eq!(metrics.dropped_errors, 1);
}

#[tokio::test]
async fn capture_survives_persistence_failures() {
    let env = TestEnv::new();
    env.store.fail_writes(true);
    let pipeline = pipeline(&env);

    let result = pipeline
        .capture(RawEvent::message("still works"), ContextOverrides::default())
        .await;

    assert!(result.is_some());
    assert_eq!(env.storage.queue.stats().await.item_count, 1);
    assert!(env.store.write_failures() > 0);
}

#[tokio::test]
async fn overrides_take_precedence_over_scope() {
    let env = TestEnv::new();
    let pipeline = pipeline(&env);
    pipeline.set_user(Some(fixtures::user("ambient", "ambient@example.com"))).await;
    pipeline.set_tag("env", "staging").await;

    let overrides = ContextOverrides {
        user: Some(fixtures::user("override", "override@example.com")),
        tags: [("env".to_string(), "prod".to_string())].into(),
    };
    let captured = pipeline
        .capture(RawEvent::message("boom"), overrides)
        .await
        .expect("record should be enqueued");

    assert_eq!(captured.user.as_ref().and_then(|u| u.id.as_deref()), Some("override"));
    assert_eq!(captured.tags.get("env").map(String::as_str), Some("prod"));
}

#[tokio::test]
async fn scope_updates_forward_to_current_adapter() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");
    let pipeline = pipeline(&env);

    pipeline.set_user(Some(fixtures::user("u-1", "ada@example.com"))).await;
    pipeline.add_breadcrumb(fixtures::breadcrumb("nav", "/settings")).await;

    assert_eq!(adapter.contexts().len(), 1);
    assert_eq!(adapter.breadcrumbs().len(), 1);

    pipeline.reset_scope().await;
    let contexts = adapter.contexts();
    let last = contexts.last().expect("reset forwards a context");
    assert!(last.user.is_none());
    assert!(last.tags.is_empty());
}

#[tokio::test(start_paused = true)]
async fn capture_nudges_attached_engine() {
    let env = TestEnv::new();
    let adapter = MockAdapter::new();
    env.install_adapter("p", adapter.clone()).await.expect("activation should succeed");

    let mut engine = env.engine(Default::default());
    let pipeline = pipeline(&env);
    pipeline.attach_engine(engine.drain_handle());
    engine.start();

    pipeline.capture(RawEvent::message("boom"), ContextOverrides::default()).await;

    for _ in 0..100 {
        if env.storage.queue.stats().await.item_count == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(adapter.send_count(), 1);

    engine.shutdown().await.expect("shutdown within timeout");
}
