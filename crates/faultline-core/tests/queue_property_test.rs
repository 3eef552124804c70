//! Property-based tests for queue bounds and eviction ordering.
//!
//! Validates the lossy-under-pressure policy: for any enqueue sequence past
//! the configured maximum, the settled size equals the maximum and the
//! evicted items are exactly the oldest by timestamp.

use std::sync::Arc;

use chrono::Utc;
use faultline_core::{
    models::{ErrorId, Level, NormalizedError, Provider},
    storage::{MemoryStore, QueueConfig, QueueStore},
    time::TestClock,
};
use proptest::prelude::*;

fn numbered_error(n: usize) -> NormalizedError {
    NormalizedError {
        id: ErrorId::new(),
        message: format!("error-{n}"),
        kind: "Error".to_string(),
        level: Level::Error,
        stack: Vec::new(),
        timestamp: Utc::now(),
        tags: Default::default(),
        extra: Default::default(),
        breadcrumbs: Vec::new(),
        user: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queue_never_exceeds_bound_and_keeps_newest(
        total in 1usize..40,
        max_items in 1usize..10,
        providers in prop::collection::vec(0u8..3, 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        runtime.block_on(async move {
            let clock = Arc::new(TestClock::new());
            let queue = QueueStore::new(
                Arc::new(MemoryStore::new()),
                clock.clone(),
                QueueConfig { max_items, ..Default::default() },
            );

            let mut evicted_total = 0usize;
            for n in 0..total {
                let lane = providers[n % providers.len()];
                let outcome = queue
                    .enqueue(numbered_error(n), Provider::from(format!("lane-{lane}").as_str()))
                    .await;
                evicted_total += outcome.evicted;
                // Distinct timestamps keep eviction order deterministic.
                clock.advance(std::time::Duration::from_millis(1));
            }

            let items = queue.dequeue_batch(None, usize::MAX).await;
            let expected_len = total.min(max_items);
            prop_assert_eq!(items.len(), expected_len);
            prop_assert_eq!(evicted_total, total - expected_len);

            // Survivors are exactly the newest records, still oldest-first.
            for (offset, item) in items.iter().enumerate() {
                let expected = total - expected_len + offset;
                prop_assert_eq!(item.error.message.clone(), format!("error-{expected}"));
            }

            // Timestamps are non-decreasing across the batch.
            for pair in items.windows(2) {
                prop_assert!(pair[0].created_at <= pair[1].created_at);
            }

            Ok(())
        })?;
    }
}
