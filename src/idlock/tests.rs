//! Tests for the per-id lock table.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::*;

#[tokio::test]
async fn distinct_ids_do_not_block_each_other() {
    let locks = IdLock::new();
    let held = locks.acquire("machine-a").await;

    let other = timeout(Duration::from_secs(1), locks.acquire("machine-b"))
        .await
        .unwrap_or_else(|err| panic!("distinct id should not block: {err}"));

    assert_eq!(held.id(), "machine-a");
    assert_eq!(other.id(), "machine-b");
    assert_eq!(locks.len(), 2);
}

#[tokio::test]
async fn same_id_blocks_until_release() {
    let locks = IdLock::new();
    let held = locks.acquire("machine-a").await;

    let blocked = timeout(Duration::from_millis(50), locks.acquire("machine-a")).await;
    assert!(blocked.is_err(), "second acquire should wait for the holder");

    drop(held);
    let reacquired = timeout(Duration::from_secs(1), locks.acquire("machine-a"))
        .await
        .unwrap_or_else(|err| panic!("lock should be free after release: {err}"));
    assert_eq!(reacquired.id(), "machine-a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_holder_per_id() {
    let locks = IdLock::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let task_locks = locks.clone();
        let task_inside = Arc::clone(&inside);
        let task_peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let guard = task_locks.acquire("shared").await;
            let now = task_inside.fetch_add(1, Ordering::SeqCst) + 1;
            task_peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(1)).await;
            task_inside.fetch_sub(1, Ordering::SeqCst);
            drop(guard);
        }));
    }
    for task in tasks {
        task.await
            .unwrap_or_else(|err| panic!("lock task panicked: {err}"));
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(locks.is_empty(), "table should be empty after all releases");
}

#[tokio::test]
async fn entry_is_removed_when_last_reference_is_released() {
    let locks = IdLock::new();
    let guard = locks.acquire("machine-a").await;
    assert_eq!(locks.references("machine-a"), 1);

    guard
        .release()
        .unwrap_or_else(|err| panic!("release should succeed: {err}"));
    assert!(locks.is_empty());
    assert_eq!(locks.references("machine-a"), 0);
}

#[tokio::test]
async fn reacquire_after_removal_creates_fresh_entry() {
    let locks = IdLock::new();
    for _ in 0..100 {
        let guard = locks.acquire("machine-a").await;
        assert_eq!(locks.references("machine-a"), 1);
        guard
            .release()
            .unwrap_or_else(|err| panic!("release should succeed: {err}"));
        assert!(locks.is_empty());
    }
}

#[tokio::test]
async fn waiters_keep_entry_alive_until_they_finish() {
    let locks = IdLock::new();
    let held = locks.acquire("machine-a").await;

    let waiter_locks = locks.clone();
    let waiter = tokio::spawn(async move {
        let guard = waiter_locks.acquire("machine-a").await;
        guard.release()
    });

    while locks.references("machine-a") < 2 {
        sleep(Duration::from_millis(1)).await;
    }
    drop(held);
    assert!(locks.references("machine-a") >= 1);

    waiter
        .await
        .unwrap_or_else(|err| panic!("waiter panicked: {err}"))
        .unwrap_or_else(|err| panic!("waiter release failed: {err}"));
    assert!(locks.is_empty());
}

#[tokio::test]
async fn cancelled_acquire_does_not_leak_entry() {
    let locks = IdLock::new();
    let held = locks.acquire("machine-a").await;

    let cancelled = timeout(Duration::from_millis(10), locks.acquire("machine-a")).await;
    assert!(cancelled.is_err());
    assert_eq!(locks.references("machine-a"), 1);

    drop(held);
    assert!(locks.is_empty());
}
