//! Task pool integration tests
//!
//! Liveness across pool sizes, failure aggregation and nested waiting

use kiln_build::{TaskGroup, TaskPool};
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[rstest]
fn test_sync_returns_after_all_tasks(
    #[values(1, 2, 4, 16)] jobs: usize,
    #[values(0, 1, 100, 3000)] tasks: usize,
) {
    let pool = TaskPool::new(jobs);
    let group = TaskGroup::new(&pool);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..tasks {
        let counter = Arc::clone(&counter);
        group.run(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
    }

    assert!(group.sync());
    assert_eq!(counter.load(Ordering::SeqCst), tasks);
    assert_eq!(group.pending(), 0);
}

#[test]
fn test_failure_is_aggregated() {
    let pool = TaskPool::new(4);
    let group = TaskGroup::new(&pool);
    let ran = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let ran = Arc::clone(&ran);
        group.run(move || {
            ran.lock().unwrap().push(i);
            i != 5
        });
    }

    assert!(!group.sync());
    assert!(!group.is_success());

    let mut ran = ran.lock().unwrap().clone();
    ran.sort_unstable();
    assert_eq!(ran, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_groups_fail_independently() {
    let pool = TaskPool::new(3);
    let failing = TaskGroup::new(&pool);
    let passing = TaskGroup::new(&pool);

    for i in 0..20 {
        failing.run(move || i % 7 != 3);
        passing.run(|| true);
    }

    assert!(passing.sync());
    assert!(!failing.sync());
}

#[rstest]
fn test_nested_sync_inside_tasks(#[values(1, 2, 8)] jobs: usize) {
    let pool = TaskPool::new(jobs);
    let outer = TaskGroup::new(&pool);
    let leaves = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let pool = pool.clone();
        let leaves = Arc::clone(&leaves);
        outer.run(move || {
            let inner = TaskGroup::new(&pool);
            for _ in 0..8 {
                let leaves = Arc::clone(&leaves);
                inner.run(move || {
                    leaves.fetch_add(1, Ordering::SeqCst);
                    true
                });
            }
            inner.sync()
        });
    }

    assert!(outer.sync());
    assert_eq!(leaves.load(Ordering::SeqCst), 64);
}

#[test]
fn test_tasks_run_in_parallel() {
    let pool = TaskPool::new(4);
    let group = TaskGroup::new(&pool);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        group.run(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            active.fetch_sub(1, Ordering::SeqCst);
            true
        });
    }

    assert!(group.sync());
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak > 1, "peak parallelism was {}", peak);
    assert!(peak <= 4);
}

#[test]
fn test_dropping_pool_joins_workers() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = TaskPool::new(4);
        let group = TaskGroup::new(&pool);
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            group.run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            });
        }
        assert!(group.sync());
        assert_eq!(pool.running_workers(), 3);
    }
    // Every task closure was dropped after running
    assert_eq!(Arc::strong_count(&counter), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}
