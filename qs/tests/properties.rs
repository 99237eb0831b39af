//! Property tests for queue invariants

use std::time::Duration;

use proptest::prelude::*;
use queuestore::{FailOutcome, QueueStore, RetryPolicy, StoreOptions};
use serde_json::json;

const T0: i64 = 1_700_000_000_000;

fn store_with(max_retries: u32) -> QueueStore {
    QueueStore::open_in_memory(StoreOptions {
        retry: RetryPolicy {
            max_retries,
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap()
}

proptest! {
    #[test]
    fn resubmission_keeps_one_row_at_max_priority(priorities in prop::collection::vec(-1000i64..1000, 1..20)) {
        let store = store_with(3);
        let item = [json!({"url": "https://example.com/", "device": "desktop"})];
        for priority in &priorities {
            store.enqueue_at("preload", &item, *priority, T0).unwrap();
        }

        let tasks = store.list("preload", 10).unwrap();
        prop_assert_eq!(tasks.len(), 1);
        prop_assert_eq!(tasks[0].priority, *priorities.iter().max().unwrap());
    }

    #[test]
    fn fail_max_retries_times_removes_task(max_retries in 1u32..8) {
        let store = store_with(max_retries);
        store.enqueue_at("q", &[json!("job")], 0, T0).unwrap();
        let id = store.claim_batch_at("q", 1, None, T0).unwrap()[0].id;

        let mut last = None;
        for _ in 0..max_retries {
            last = Some(store.fail_at(id, T0).unwrap());
        }

        prop_assert_eq!(last, Some(FailOutcome::Dropped { retries: max_retries }));
        prop_assert!(store.get(id).unwrap().is_none());
    }

    #[test]
    fn backoff_after_kth_failure_is_two_pow_k_base(k in 0u32..20) {
        let policy = RetryPolicy::default();
        prop_assert_eq!(policy.delay_for(k), Duration::from_secs(120 * 2u64.pow(k)));
        prop_assert!(policy.delay_for(k) < policy.delay_for(k + 1));
    }

    #[test]
    fn claims_are_ordered_by_priority_then_insertion(priorities in prop::collection::vec(0i64..5, 1..30)) {
        let store = store_with(3);
        for (i, priority) in priorities.iter().enumerate() {
            store.enqueue_at("q", &[json!(i)], *priority, T0).unwrap();
        }

        let batch = store.claim_batch_at("q", priorities.len(), None, T0).unwrap();
        let keys: Vec<(i64, i64)> = batch.iter().map(|t| (-t.priority, t.id.0)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);
    }
}

#[test]
fn test_retry_delays_recorded_on_task() {
    let store = store_with(5);
    store.enqueue_at("q", &[json!("job")], 0, T0).unwrap();
    let id = store.claim_batch_at("q", 1, None, T0).unwrap()[0].id;

    let mut previous_delay = 0;
    for k in 1..5u32 {
        let FailOutcome::Retrying { retries, next_retry_at } = store.fail_at(id, T0).unwrap() else {
            panic!("dropped before the ceiling");
        };
        assert_eq!(retries, k);
        let delay = next_retry_at - T0;
        assert_eq!(delay, 2i64.pow(k) * 120_000);
        assert!(delay > previous_delay);
        previous_delay = delay;
    }
}
