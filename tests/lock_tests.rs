use payflow::domain::lock::{LockManager, LockOptions, try_with_lock, with_lock};
use payflow::error::{ErrorCode, Result};
use payflow::infrastructure::lock::LocalLockManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_with_lock_serializes_critical_sections() {
    let manager = Arc::new(LocalLockManager::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        let inside = Arc::clone(&inside);
        let overlaps = Arc::clone(&overlaps);
        tasks.push(tokio::spawn(async move {
            with_lock(manager.as_ref(), "A1:U1", LockOptions::default(), async {
                if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_with_lock_propagates_work_error_and_releases() {
    let manager = LocalLockManager::new();

    let result: Result<()> = with_lock(&manager, "k", LockOptions::default(), async {
        Err(ErrorCode::ChannelFailure.into())
    })
    .await;
    assert!(result.unwrap_err().as_business().unwrap().is(ErrorCode::ChannelFailure));

    assert!(manager.try_lock("k", LockOptions::default()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_try_with_lock_falls_back_when_contended() {
    let manager = LocalLockManager::new();
    let _held = manager.lock("k", LockOptions::default()).await.unwrap();

    let ran = try_with_lock(
        &manager,
        "k",
        LockOptions::default(),
        async { Ok("work") },
        async { Ok("fallback") },
    )
    .await
    .unwrap();
    assert_eq!(ran, "fallback");

    let ran = try_with_lock(
        &manager,
        "other",
        LockOptions::default(),
        async { Ok("work") },
        async { Ok("fallback") },
    )
    .await
    .unwrap();
    assert_eq!(ran, "work");
}

#[tokio::test]
async fn test_bounded_wait_with_retries_times_out() {
    let manager = LocalLockManager::new();
    let _held = manager.lock("k", LockOptions::default()).await.unwrap();

    let options = LockOptions::waiting(Duration::from_millis(10)).with_retries(2);
    let started = std::time::Instant::now();
    let err = manager.lock("k", options).await.unwrap_err();

    assert!(err.as_business().unwrap().is(ErrorCode::LockNotAcquired));
    assert!(started.elapsed() >= Duration::from_millis(30));
}
