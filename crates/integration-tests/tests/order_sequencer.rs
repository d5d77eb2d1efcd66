//! Integration tests for order numbering.
//!
//! These tests drive the sequencer through real JSON counter files and
//! through in-memory stores that fail or stall.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bakery_orders_bot::services::{
    CounterStore, JsonFileCounterStore, OrderSequencer, Persistence,
};
use bakery_orders_core::{ManualClock, StoredCounter};
use bakery_orders_integration_tests::{MemoryCounterStore, morning, store_offset};
use chrono::{TimeZone, Utc};

async fn sequencer_over(
    store: Arc<dyn CounterStore>,
    clock: Arc<ManualClock>,
    timeout: Duration,
) -> OrderSequencer {
    OrderSequencer::load(store, clock, store_offset(), timeout).await
}

// =============================================================================
// Uniqueness
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_get_distinct_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileCounterStore::new(dir.path().join("counter.json")));
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));
    let sequencer = Arc::new(sequencer_over(store.clone(), clock, Duration::from_secs(5)).await);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let sequencer = Arc::clone(&sequencer);
            tokio::spawn(async move { sequencer.next_order_number().await })
        })
        .collect();

    let mut sequences = Vec::new();
    for handle in handles {
        let assignment = handle.await.unwrap();
        assert_eq!(assignment.persistence, Persistence::Saved);
        sequences.push(assignment.number.sequence().unwrap());
    }
    sequences.sort_unstable();

    assert_eq!(sequences, (1..=40).collect::<Vec<u32>>());
    assert_eq!(store.load().await.unwrap().unwrap().counter, 40);
}

// =============================================================================
// Month rollover
// =============================================================================

#[tokio::test]
async fn test_first_order_of_new_month_restarts_at_one() {
    let store = Arc::new(MemoryCounterStore::with_record(StoredCounter {
        counter: 5,
        month: 3,
        year: Some(2024),
    }));
    let clock = Arc::new(ManualClock::new(morning(2024, 4, 2)));
    let sequencer = sequencer_over(store.clone(), clock, Duration::from_secs(5)).await;

    let first = sequencer.next_order_number().await;
    let second = sequencer.next_order_number().await;

    assert_eq!(first.number.to_string(), "#020424/001");
    assert_eq!(second.number.to_string(), "#020424/002");
    assert_eq!(
        store.record(),
        Some(StoredCounter {
            counter: 2,
            month: 4,
            year: Some(2024)
        })
    );
}

#[tokio::test]
async fn test_same_month_a_year_later_rolls_over() {
    let store = Arc::new(MemoryCounterStore::with_record(StoredCounter {
        counter: 88,
        month: 5,
        year: Some(2023),
    }));
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));
    let sequencer = sequencer_over(store, clock, Duration::from_secs(5)).await;

    assert_eq!(
        sequencer.next_order_number().await.number.to_string(),
        "#210524/001"
    );
}

#[tokio::test]
async fn test_clock_stepping_back_across_month_keeps_numbers_unique() {
    let store = Arc::new(MemoryCounterStore::default());
    // 00:00:05 on 1 May in store time.
    let may = Utc.with_ymd_and_hms(2024, 4, 30, 21, 0, 5).unwrap();
    let clock = Arc::new(ManualClock::new(may));
    let sequencer = sequencer_over(store.clone(), clock.clone(), Duration::from_secs(5)).await;

    let first = sequencer.next_order_number().await;
    clock.set(Utc.with_ymd_and_hms(2024, 4, 30, 20, 59, 58).unwrap());
    let second = sequencer.next_order_number().await;
    clock.set(may);
    let third = sequencer.next_order_number().await;

    assert_eq!(first.number.to_string(), "#010524/001");
    assert_eq!(second.number.sequence(), Some(2));
    assert_eq!(third.number.to_string(), "#010524/003");
    assert_ne!(first.number, third.number);
    assert_eq!(
        store.record(),
        Some(StoredCounter {
            counter: 3,
            month: 5,
            year: Some(2024)
        })
    );
}

// =============================================================================
// Durability
// =============================================================================

#[tokio::test]
async fn test_counter_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.json");
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));

    let before = sequencer_over(
        Arc::new(JsonFileCounterStore::new(&path)),
        clock.clone(),
        Duration::from_secs(5),
    )
    .await;
    for _ in 0..3 {
        before.next_order_number().await;
    }
    drop(before);

    let after = sequencer_over(
        Arc::new(JsonFileCounterStore::new(&path)),
        clock,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(
        after.next_order_number().await.number.to_string(),
        "#210524/004"
    );
}

#[tokio::test]
async fn test_missing_file_is_created_at_start_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/counter.json");
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));

    let sequencer = sequencer_over(
        Arc::new(JsonFileCounterStore::new(&path)),
        clock,
        Duration::from_secs(5),
    )
    .await;

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, r#"{"counter":0,"month":5,"year":2024}"#);
    assert_eq!(
        sequencer.next_order_number().await.number.to_string(),
        "#210524/001"
    );
}

#[tokio::test]
async fn test_corrupt_file_restarts_month() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.json");
    std::fs::write(&path, "{\"counter\": 12, \"month\":").unwrap();
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));

    let store = Arc::new(JsonFileCounterStore::new(&path));
    let sequencer = sequencer_over(store.clone(), clock, Duration::from_secs(5)).await;

    assert_eq!(sequencer.snapshot().await.count(), 0);
    let assignment = sequencer.next_order_number().await;
    assert_eq!(assignment.number.to_string(), "#210524/001");
    assert_eq!(store.load().await.unwrap().unwrap().counter, 1);
}

#[tokio::test]
async fn test_empty_file_restarts_month() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.json");
    std::fs::write(&path, "").unwrap();
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));

    let sequencer = sequencer_over(
        Arc::new(JsonFileCounterStore::new(&path)),
        clock,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(
        sequencer.next_order_number().await.number.sequence(),
        Some(1)
    );
}

// =============================================================================
// Persistence failures
// =============================================================================

#[tokio::test]
async fn test_failed_save_still_issues_number() {
    let store = Arc::new(MemoryCounterStore::failing());
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));
    let sequencer = sequencer_over(store, clock, Duration::from_secs(5)).await;

    let first = sequencer.next_order_number().await;
    let second = sequencer.next_order_number().await;

    assert!(matches!(first.persistence, Persistence::Failed(_)));
    assert!(first.is_degraded());
    assert_eq!(first.number.to_string(), "#210524/001");
    assert_eq!(second.number.to_string(), "#210524/002");
}

#[tokio::test]
async fn test_stalled_save_times_out_and_releases_lock() {
    let store = Arc::new(MemoryCounterStore::slow(Duration::from_secs(2)));
    let clock = Arc::new(ManualClock::new(morning(2024, 5, 21)));
    let sequencer = sequencer_over(store.clone(), clock, Duration::from_millis(50)).await;

    let started = Instant::now();
    let first = sequencer.next_order_number().await;
    let second = sequencer.next_order_number().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(first.persistence, Persistence::TimedOut);
    assert_eq!(first.number.to_string(), "#210524/001");
    assert_eq!(second.number.to_string(), "#210524/002");
    assert_eq!(store.record(), None);
}
