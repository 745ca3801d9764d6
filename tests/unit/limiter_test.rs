//! Unit tests for the concurrency limiter

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prompt_image_gateway::queue::ConcurrencyLimiter;
use prompt_image_gateway::AppError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_never_exceeds_capacity() {
    let limiter = Arc::new(ConcurrencyLimiter::new("test", 2));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            let completed = completed.clone();
            tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, AppError>(())
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(completed.load(Ordering::SeqCst), 5);
    assert_eq!(limiter.available(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_release_their_permit() {
    let limiter = Arc::new(ConcurrencyLimiter::new("test", 2));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        if i % 2 == 0 {
                            Err(AppError::Upstream("boom".to_string()))
                        } else {
                            Ok(i)
                        }
                    })
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 3);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(limiter.available(), 2);
    assert_eq!(limiter.stats().acquired_total, 5);
}

#[tokio::test]
async fn test_waiters_are_served_in_arrival_order() {
    let limiter = Arc::new(ConcurrencyLimiter::new("fifo", 1));
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let held = limiter.acquire().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let task_limiter = limiter.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            let permit = task_limiter.acquire().await.unwrap();
            order.lock().push(i);
            permit.release();
        }));
        // Make arrival order deterministic
        while limiter.waiting() < (i + 1) as u64 {
            tokio::task::yield_now().await;
        }
    }

    held.release();
    join_all(handles).await;

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_dropped_permit_is_returned() {
    let limiter = ConcurrencyLimiter::new("drop", 1);
    {
        let _permit = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
    }
    assert_eq!(limiter.available(), 1);
}
