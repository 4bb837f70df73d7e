//! Integration tests for the bounded scheduler.
//!
//! These validate:
//! 1. The concurrency ceiling is never exceeded
//! 2. Failing work units free their slot
//! 3. Queued work units are admitted in submission order
//! 4. Results are returned unchanged to each caller

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use caldera_client::core::BoundedScheduler;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;

// Records the peak number of units observed running at once.
#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ceiling_never_exceeded() {
    let scheduler = BoundedScheduler::new(3).unwrap();
    let gauge = Arc::new(Gauge::default());

    let handles: Vec<_> = (0..20u64)
        .map(|i| {
            let scheduler = scheduler.clone();
            let gauge = Arc::clone(&gauge);
            tokio::spawn(async move {
                scheduler
                    .schedule(|| async move {
                        gauge.enter();
                        tokio::time::sleep(Duration::from_millis(5 + i % 3)).await;
                        gauge.exit();
                        i * 2
                    })
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results, (0..20u64).map(|i| i * 2).collect::<Vec<_>>());
    assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    assert!(gauge.peak.load(Ordering::SeqCst) >= 1);

    let stats = scheduler.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.admitted, 20);
    assert_eq!(stats.completed, 20);
}

#[tokio::test]
async fn test_failing_units_release_slots() {
    let scheduler = BoundedScheduler::new(2).unwrap();

    let outcomes = join_all((0..6).map(|i| {
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .schedule(|| async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    if i % 2 == 0 {
                        Err(format!("unit {i} failed"))
                    } else {
                        Ok(i)
                    }
                })
                .await
        }
    }))
    .await;

    assert_eq!(outcomes.iter().filter(|r| r.is_err()).count(), 3);
    assert_eq!(outcomes[0], Err("unit 0 failed".to_string()));
    assert_eq!(outcomes[1], Ok(1));

    let stats = scheduler.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_extra_unit_waits_for_a_failing_unit_to_finish() {
    let scheduler = BoundedScheduler::new(2).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let failing = |name: &'static str| {
        let scheduler = scheduler.clone();
        let events = Arc::clone(&events);
        async move {
            scheduler
                .schedule(|| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    events.lock().push(name);
                    Err::<(), _>(name)
                })
                .await
        }
    };
    let extra = {
        let scheduler = scheduler.clone();
        let events = Arc::clone(&events);
        async move {
            scheduler
                .schedule(|| async move {
                    events.lock().push("extra-start");
                    Ok::<(), &str>(())
                })
                .await
        }
    };

    let (a, b, c) = tokio::join!(failing("fail-a"), failing("fail-b"), extra);
    assert!(a.is_err() && b.is_err() && c.is_ok());

    let events = events.lock().clone();
    let extra_at = events.iter().position(|e| *e == "extra-start").unwrap();
    assert!(extra_at >= 1, "extra unit started before any slot was freed: {events:?}");
}

#[tokio::test]
async fn test_queued_units_start_in_submission_order() {
    let scheduler = BoundedScheduler::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let run = |name: &'static str| {
        let scheduler = scheduler.clone();
        let order = Arc::clone(&order);
        async move {
            scheduler
                .schedule(|| async move {
                    order.lock().push(name);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    name
                })
                .await
        }
    };

    let (a, b, c) = tokio::join!(run("A"), run("B"), run("C"));
    assert_eq!((a, b, c), ("A", "B", "C"));
    assert_eq!(*order.lock(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_new_submission_does_not_overtake_waiters() {
    let scheduler = BoundedScheduler::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let holder = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .schedule(|| async move {
                    let _ = release_rx.await;
                })
                .await;
        })
    };
    while scheduler.stats().active == 0 {
        tokio::task::yield_now().await;
    }

    let spawn_named = |name: &'static str| {
        let scheduler = scheduler.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            scheduler
                .schedule(|| async move {
                    order.lock().push(name);
                })
                .await;
        })
    };

    let first = spawn_named("queued-first");
    while scheduler.stats().pending < 1 {
        tokio::task::yield_now().await;
    }
    let second = spawn_named("queued-second");
    while scheduler.stats().pending < 2 {
        tokio::task::yield_now().await;
    }

    release_tx.send(()).unwrap();
    holder.await.unwrap();
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(*order.lock(), vec!["queued-first", "queued-second"]);
    assert_eq!(scheduler.stats().active, 0);
}

#[tokio::test]
async fn test_abandoned_unit_frees_slot() {
    let scheduler = BoundedScheduler::new(1).unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        scheduler.schedule(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(scheduler.stats().active, 0);

    let value = tokio::time::timeout(Duration::from_secs(1), scheduler.schedule(|| async { 9 }))
        .await
        .unwrap();
    assert_eq!(value, 9);
}

#[tokio::test]
async fn test_withdrawn_waiter_keeps_queue_order() {
    let scheduler = BoundedScheduler::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let holder = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .schedule(|| async move {
                    let _ = release_rx.await;
                })
                .await;
        })
    };
    while scheduler.stats().active == 0 {
        tokio::task::yield_now().await;
    }

    let spawn_named = |name: &'static str| {
        let scheduler = scheduler.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            scheduler
                .schedule(|| async move {
                    order.lock().push(name);
                })
                .await;
        })
    };

    let first = spawn_named("first");
    while scheduler.stats().pending < 1 {
        tokio::task::yield_now().await;
    }
    let withdrawn = spawn_named("withdrawn");
    while scheduler.stats().pending < 2 {
        tokio::task::yield_now().await;
    }
    let last = spawn_named("last");
    while scheduler.stats().pending < 3 {
        tokio::task::yield_now().await;
    }

    withdrawn.abort();
    assert!(withdrawn.await.unwrap_err().is_cancelled());
    assert_eq!(scheduler.stats().pending, 2);

    release_tx.send(()).unwrap();
    holder.await.unwrap();
    first.await.unwrap();
    last.await.unwrap();

    assert_eq!(*order.lock(), vec!["first", "last"]);
    let stats = scheduler.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.admitted, 3);
}
