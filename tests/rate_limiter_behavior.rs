//! Behavior tests for the shared upstream request queue.
//!
//! These run against the real clock with short delays, so spacing
//! assertions allow a small scheduler tolerance.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use pricecache_core::{QueueError, RequestQueue, ThrottleConfig};

const MIN_DELAY: Duration = Duration::from_millis(60);
const TOLERANCE: Duration = Duration::from_millis(5);

fn assert_spaced(starts: &[Instant]) {
    for pair in starts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap + TOLERANCE >= MIN_DELAY,
            "requests started {gap:?} apart, expected at least {MIN_DELAY:?}"
        );
    }
}

// =============================================================================
// Ordering and spacing
// =============================================================================

#[tokio::test]
async fn concurrent_requests_run_in_enqueue_order_and_are_spaced() {
    // Given: A queue with a minimum delay between request starts
    let queue = RequestQueue::new(ThrottleConfig::new(MIN_DELAY));
    let starts = Arc::new(Mutex::new(Vec::new()));

    // When: Four callers enqueue at the same moment
    let calls = (0..4)
        .map(|index| {
            let starts = Arc::clone(&starts);
            queue.enqueue(move || async move {
                starts
                    .lock()
                    .expect("start log lock")
                    .push((index, Instant::now()));
                index
            })
        })
        .collect::<Vec<_>>();
    let results = join_all(calls).await;

    // Then: Every caller gets its own result
    assert_eq!(results, vec![Ok(0), Ok(1), Ok(2), Ok(3)]);

    // And: Requests ran in enqueue order, never closer than the minimum delay
    let starts = starts.lock().expect("start log lock").clone();
    let order = starts.iter().map(|(index, _)| *index).collect::<Vec<_>>();
    assert_eq!(order, vec![0, 1, 2, 3]);
    let instants = starts.iter().map(|(_, at)| *at).collect::<Vec<_>>();
    assert_spaced(&instants);
}

#[tokio::test]
async fn requests_from_independent_tasks_share_one_spacing() {
    // Given: A queue handle cloned into several spawned tasks
    let queue = RequestQueue::new(ThrottleConfig::new(MIN_DELAY));
    let starts = Arc::new(Mutex::new(Vec::new()));

    // When: Each task enqueues one request
    let tasks = (0..3)
        .map(|_| {
            let queue = queue.clone();
            let starts = Arc::clone(&starts);
            tokio::spawn(async move {
                queue
                    .enqueue(move || async move {
                        starts.lock().expect("start log lock").push(Instant::now());
                    })
                    .await
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.expect("task joins").expect("request runs");
    }

    // Then: The clones never ran two requests closer than the minimum delay
    let mut starts = starts.lock().expect("start log lock").clone();
    starts.sort();
    assert_eq!(starts.len(), 3);
    assert_spaced(&starts);
}

#[tokio::test]
async fn idle_queue_runs_the_next_request_without_waiting() {
    // Given: A queue that served one request and then sat idle past the delay
    let queue = RequestQueue::new(ThrottleConfig::new(MIN_DELAY));
    queue.enqueue(|| async {}).await.expect("first request");
    tokio::time::sleep(MIN_DELAY * 2).await;

    // When: Another request arrives
    let enqueued_at = Instant::now();
    let started_at = queue
        .enqueue(|| async { Instant::now() })
        .await
        .expect("second request");

    // Then: It starts right away
    assert!(started_at.duration_since(enqueued_at) < MIN_DELAY / 2);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn rejected_request_is_forwarded_and_queue_keeps_draining() {
    // Given: A failing request queued ahead of a succeeding one
    let queue = RequestQueue::new(ThrottleConfig::new(Duration::from_millis(10)));

    let failing = queue.enqueue(|| async { Err::<u32, String>(String::from("upstream 500")) });
    let succeeding = queue.enqueue(|| async { Ok::<u32, String>(42) });

    // When: Both settle
    let failed = failing.await.expect("queue delivers the outcome");
    let succeeded = succeeding.await.expect("queue delivers the outcome");

    // Then: The failure reaches its caller untouched and the next request still runs
    assert_eq!(failed, Err(String::from("upstream 500")));
    assert_eq!(succeeded, Ok(42));
}

#[tokio::test]
async fn panicking_request_is_reported_without_poisoning_the_queue() {
    // Given: A request that panics
    let queue = RequestQueue::new(ThrottleConfig::new(Duration::from_millis(10)));
    let panicking = queue.enqueue(|| async {
        let explode = true;
        if explode {
            panic!("adapter bug");
        }
        0_u32
    });
    let after = queue.enqueue(|| async { 1_u32 });

    // Then: Its caller sees a panic error and later requests still run
    assert_eq!(panicking.await, Err(QueueError::RequestPanicked));
    assert_eq!(after.await, Ok(1));
}

#[tokio::test]
async fn queued_requests_are_not_cancelled_by_callers_giving_up() {
    // Given: A slow queue with one request in flight
    let queue = RequestQueue::new(ThrottleConfig::new(Duration::from_millis(30)));
    let ran = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let ran = Arc::clone(&ran);
        queue.enqueue(move || async move { ran.lock().expect("ran lock").push("first") })
    };

    // When: The caller of the second request stops waiting immediately
    {
        let ran = Arc::clone(&ran);
        drop(queue.enqueue(move || async move { ran.lock().expect("ran lock").push("second") }));
    }
    let third = {
        let ran = Arc::clone(&ran);
        queue.enqueue(move || async move { ran.lock().expect("ran lock").push("third") })
    };

    first.await.expect("first runs");
    third.await.expect("third runs");

    // Then: The abandoned request still ran, in its turn
    assert_eq!(
        *ran.lock().expect("ran lock"),
        vec!["first", "second", "third"]
    );
    assert_eq!(queue.pending_len(), 0);
}
