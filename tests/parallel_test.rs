// Integration tests for fan-out cancellation

use anyhow::anyhow;
use daylog::parallel::{flat_map, for_each};
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Input that yields to the scheduler before each element, so spawned
/// operations get to run between elements.
fn slow_input(n: u32) -> impl futures::Stream<Item = u32> {
    stream::iter(1..=n).then(|i| async move {
        tokio::task::yield_now().await;
        i
    })
}

#[tokio::test]
async fn test_first_failure_cancels_remaining_elements() {
    let started = Arc::new(Mutex::new(Vec::new()));

    let result = for_each(slow_input(5), |i, _cancel| {
        let started = started.clone();
        async move {
            started.lock().unwrap().push(i);
            if i == 3 {
                return Err(anyhow!("element {} failed", i));
            }
            // Long-running work that only cancellation ends
            std::future::pending::<()>().await;
            Ok(())
        }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "element 3 failed");

    let started = started.lock().unwrap();
    assert!(started.len() < 5, "started: {:?}", started);
    assert!(!started.contains(&4));
    assert!(!started.contains(&5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_for_each_success_on_multi_thread_runtime() {
    let done = Arc::new(AtomicUsize::new(0));

    for_each(stream::iter(0..50), |_, _| {
        let done = done.clone();
        async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            done.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_flat_map_failure_keeps_delivered_items() {
    let mut merged = flat_map(slow_input(4), |i, _cancel| async move {
        if i == 2 {
            return Err(anyhow!("repository {} failed", i));
        }
        if i > 2 {
            std::future::pending::<()>().await;
        }
        anyhow::Ok(stream::iter(vec![Ok(i * 100), Ok(i * 100 + 1)]))
    });

    let mut delivered = Vec::new();
    while let Some(value) = merged.next().await {
        delivered.push(value);
    }

    let err = merged.finish().await.unwrap_err();
    assert_eq!(err.to_string(), "repository 2 failed");
    assert!(delivered.iter().all(|v| *v == 100 || *v == 101));
}
