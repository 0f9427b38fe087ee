//! Unit tests for the lease allocator against a scripted counter

use std::{collections::HashMap, sync::Arc};

use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use crate::counter::CounterObservation;
use crate::lease_allocator::*;
use crate::metric_definitions::{
    ACTION, ACTION_GET_VALUE, ACTION_REFILL, ACTION_SET_VALUE, ID_STREAM_FAILURE,
    ID_STREAM_REFILL_DURATION,
};
use crate::tests::stub_counter::{Call, StubCounter};
use crate::{is_lost_race, Error, IdentifierStream};

fn create_allocator(counter: &StubCounter, reservation_size: u64) -> LeaseAllocator<StubCounter> {
    LeaseAllocator::new(
        Arc::new(counter.clone()),
        AllocatorConfig::new(reservation_size),
    )
    .expect("valid config")
}

fn read(pre_value: u64) -> CounterObservation {
    CounterObservation {
        succeeded: true,
        pre_value: Some(pre_value),
        post_value: None,
    }
}

#[tokio::test]
async fn test_initializes_uninitialized_counter() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(0)]);
    counter.on_initialize(|_| Ok(true));
    let allocator = create_allocator(&counter, 10);

    allocator.prime().await.expect("prime should succeed");

    assert_eq!(counter.calls(), vec![Call::Get, Call::Initialize(10)]);
    assert!(counter.compare_and_set_calls().is_empty());
    assert!(allocator.is_ready());
    assert_eq!(allocator.next_id().await.unwrap(), 1);
}

#[tokio::test]
async fn test_compare_and_set_on_advanced_counter() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(100)]);
    // The reported post-value is deliberately wrong; it must not matter.
    counter.on_compare_and_sets(vec![CounterObservation::success(100, 100)]);
    let allocator = create_allocator(&counter, 10);

    allocator.prime().await.expect("prime should succeed");

    assert!(counter.initialize_calls().is_empty());
    assert_eq!(counter.compare_and_set_calls(), vec![(100, 110)]);
    for expected in 101..=110 {
        assert_eq!(allocator.next().await.unwrap(), expected.to_string());
    }
}

#[tokio::test]
async fn test_refills_only_when_exhausted() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(100)]);
    counter.on_compare_and_sets(vec![CounterObservation::success(100, 110)]);
    let allocator = create_allocator(&counter, 10);

    for expected in 101..=110 {
        assert_eq!(allocator.next_id().await.unwrap(), expected);
        assert_eq!(counter.get_calls(), 1, "no refill while capacity remains");
    }
    assert!(allocator.lease().await.is_exhausted());
    assert_eq!(allocator.stats().await.refills, 1);

    counter.clear_calls();
    counter.on_reads(vec![read(110)]);
    counter.on_compare_and_sets(vec![CounterObservation::success(110, 120)]);

    assert_eq!(allocator.next_id().await.unwrap(), 111);
    assert_eq!(counter.calls(), vec![Call::Get, Call::CompareAndSet(110, 120)]);

    let stats = allocator.stats().await;
    assert_eq!(stats.refills, 2);
    assert_eq!(stats.issued, 11);
    assert_eq!(stats.remaining, 9);
}

#[tokio::test(start_paused = true)]
async fn test_retries_failed_read() {
    let counter = StubCounter::new();
    counter.on_reads(vec![
        CounterObservation::failure(Some(110), Some(120)),
        read(120),
    ]);
    counter.on_compare_and_sets(vec![CounterObservation::success(120, 130)]);
    let allocator = create_allocator(&counter, 10);

    assert_eq!(allocator.next_id().await.unwrap(), 121);
    assert_eq!(
        counter.calls(),
        vec![Call::Get, Call::Get, Call::CompareAndSet(120, 130)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rereads_after_lost_race() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(100), read(120)]);
    counter.on_compare_and_sets(vec![
        CounterObservation::failure(Some(120), Some(120)),
        CounterObservation::success(120, 130),
    ]);
    let allocator = create_allocator(&counter, 10);

    let ids: Vec<u64> = {
        let mut ids = vec![];
        for _ in 0..10 {
            ids.push(allocator.next_id().await.unwrap());
        }
        ids
    };

    assert_eq!(ids, (121..=130).collect::<Vec<_>>());
    assert_eq!(counter.compare_and_set_calls(), vec![(100, 110), (120, 130)]);
    assert_eq!(counter.get_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_lost_initialize_race_is_retried() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(0), read(10)]);
    counter.on_initialize(|_| Ok(false));
    counter.on_compare_and_sets(vec![CounterObservation::success(10, 20)]);
    let allocator = create_allocator(&counter, 10);

    assert_eq!(allocator.next_id().await.unwrap(), 11);
    assert_eq!(
        counter.calls(),
        vec![
            Call::Get,
            Call::Initialize(10),
            Call::Get,
            Call::CompareAndSet(10, 20)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_store_errors_are_retried() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(40)]);
    let mut failures = 1;
    counter.on_compare_and_set(move |expected, new| {
        if failures > 0 {
            failures -= 1;
            Err(Error::store(anyhow::anyhow!("session expired")))
        } else {
            Ok(CounterObservation::success(expected, new))
        }
    });
    let allocator = create_allocator(&counter, 5);

    assert_eq!(allocator.next_id().await.unwrap(), 41);
    assert_eq!(counter.compare_and_set_calls(), vec![(40, 45), (40, 45)]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_fatal() {
    let counter = StubCounter::new();
    counter.on_get(|| Err(Error::store(anyhow::anyhow!("connection loss"))));
    let allocator = create_allocator(&counter, 10);

    let err = allocator.next_id().await.expect_err("next should fail");

    match err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, Error::Store(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(counter.get_calls(), 3);
    assert!(!allocator.is_ready());
    assert!(!IdentifierStream::ready(&allocator));
    assert!(allocator.lease().await.is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_success_keeps_ready() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(0)]);
    counter.on_initialize(|_| Ok(true));
    let allocator = create_allocator(&counter, 2);

    assert_eq!(allocator.next_id().await.unwrap(), 1);
    assert_eq!(allocator.next_id().await.unwrap(), 2);

    counter.on_reads(vec![read(2)]);
    counter.on_compare_and_sets(vec![CounterObservation::failure(Some(9), Some(9))]);

    let err = allocator.next_id().await.expect_err("next should fail");
    assert!(is_lost_race(&err));
    assert!(allocator.is_ready());
    assert_eq!(counter.compare_and_set_calls(), vec![(2, 4), (2, 4), (2, 4)]);
}

#[tokio::test]
async fn test_overflow_is_permanent() {
    let counter = StubCounter::new();
    counter.on_reads(vec![read(u64::MAX - 5)]);
    let allocator = create_allocator(&counter, 10);

    let err = allocator.next_id().await.expect_err("next should fail");

    assert!(matches!(err, Error::Overflow { .. }));
    assert_eq!(counter.calls(), vec![Call::Get]);
}

#[test]
fn test_zero_reservation_size_rejected() {
    let counter = StubCounter::new();
    let result = LeaseAllocator::new(Arc::new(counter), AllocatorConfig::new(0));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_failure_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            let counter = StubCounter::new();
            counter.on_reads(vec![
                CounterObservation::failure(None, None),
                read(100),
                read(120),
            ]);
            counter.on_compare_and_sets(vec![
                CounterObservation::failure(Some(120), Some(120)),
                CounterObservation::success(120, 130),
            ]);
            let allocator = create_allocator(&counter, 10);
            assert_eq!(allocator.next_id().await.unwrap(), 121);
        });
    });

    let mut failures = HashMap::new();
    let mut refill_timings = 0;
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let name = key.key().name().to_owned();
        match value {
            DebugValue::Counter(count) if name == ID_STREAM_FAILURE => {
                let action = key
                    .key()
                    .labels()
                    .find(|label| label.key() == ACTION)
                    .map(|label| label.value().to_owned())
                    .expect("action label");
                failures.insert(action, count);
            }
            DebugValue::Histogram(samples) if name == ID_STREAM_REFILL_DURATION => {
                refill_timings += samples.len();
            }
            _ => {}
        }
    }

    assert_eq!(failures.get(ACTION_GET_VALUE), Some(&1));
    assert_eq!(failures.get(ACTION_SET_VALUE), Some(&1));
    assert_eq!(failures.get(ACTION_REFILL), None);
    assert_eq!(refill_timings, 1);
}
