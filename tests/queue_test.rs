//! Queue admission: exclusivity, bounded concurrency and tracked retry successors.

use courier_core::error::PipelineError;
use courier_core::operation::{
    BlockOperation, Operation, OperationKind, OperationOutcome, OperationQueue, RetryPolicy,
};
use courier_core::reachability::NetworkReachability;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn gated(kind: &'static str, release: Arc<Notify>) -> BlockOperation<&'static str> {
    BlockOperation::new(OperationKind::new(kind), move |_ctx| {
        let release = release.clone();
        async move {
            release.notified().await;
            Ok(kind)
        }
    })
}

#[tokio::test]
async fn test_exclusive_submission_admits_exactly_one() {
    let queue = OperationQueue::serial("exclusive");
    let release = Arc::new(Notify::new());

    let (first, first_handle) = Operation::new(gated("sync", release.clone()));
    let (second, second_handle) = Operation::new(gated("sync", release.clone()));
    let (other, other_handle) = Operation::new(gated("fetch", release.clone()));

    assert!(queue.enqueue_exclusive(first));
    assert!(!queue.enqueue_exclusive(second));
    assert!(queue.enqueue_exclusive(other));
    assert_eq!(second_handle.outcome().await, OperationOutcome::Cancelled);
    assert_eq!(queue.operation_count(), 2);

    release.notify_one();
    assert_eq!(first_handle.outcome().await, OperationOutcome::Succeeded("sync"));
    release.notify_one();
    assert_eq!(other_handle.outcome().await, OperationOutcome::Succeeded("fetch"));

    // the kind is free again once the first one finished
    let (third, third_handle) = Operation::new(gated("sync", release.clone()));
    assert!(queue.enqueue_exclusive(third));
    release.notify_one();
    assert_eq!(third_handle.outcome().await, OperationOutcome::Succeeded("sync"));
}

#[tokio::test]
async fn test_concurrent_exclusive_submissions_race_to_one() {
    let queue = OperationQueue::concurrent("racing", 4);
    let release = Arc::new(Notify::new());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        let release = release.clone();
        tasks.push(tokio::spawn(async move {
            let (operation, _handle) = Operation::new(gated("sync", release));
            queue.enqueue_exclusive(operation)
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    queue.cancel_all();
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let queue = OperationQueue::concurrent("bounded", 2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let running = running.clone();
        let peak = peak.clone();
        let (operation, handle) = Operation::new(BlockOperation::new(
            OperationKind::new("bounded"),
            move |_ctx| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));
        queue.enqueue(operation);
        handles.push(handle);
    }

    for handle in handles {
        assert!(handle.outcome().await.is_success());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_successor_blocks_exclusive_admission() {
    let queue = OperationQueue::serial("successor");
    let attempts = Arc::new(AtomicUsize::new(0));
    let (operation, handle) = Operation::retryable(
        BlockOperation::new(OperationKind::new("flaky"), {
            let attempts = attempts.clone();
            move |_ctx| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PipelineError::network("down"))
                }
            }
        }),
        RetryPolicy::new(3).with_backoff_unit(Duration::from_secs(10)),
        Arc::new(NetworkReachability::new(true)),
    );
    let first_id = handle.id();
    assert!(queue.enqueue_exclusive(operation));

    for _ in 0..100 {
        if handle.id() != first_id {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let (duplicate, duplicate_handle) = Operation::new(BlockOperation::new(
        OperationKind::new("flaky"),
        |_ctx| async { Ok(()) },
    ));
    assert!(!queue.enqueue_exclusive(duplicate));
    assert!(duplicate_handle.outcome().await.is_cancelled());

    queue.cancel_all();
    assert!(handle.outcome().await.is_cancelled());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
