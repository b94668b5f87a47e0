use async_trait::async_trait;
use payflow::application::sequence::{RetryPolicy, SequenceDelegate};
use payflow::config::OrchestratorConfig;
use payflow::domain::ports::{GeneratorError, SequenceGenerator};
use payflow::domain::order::{Channel, NotifyChannel};
use payflow::error::ErrorCode;
use rust_decimal_macros::dec;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

mod common;
use common::{CountingGateway, FlakyGenerator, Harness, accept, fast_config};

struct Rejecting {
    calls: AtomicUsize,
}

#[async_trait]
impl SequenceGenerator for Rejecting {
    async fn generate(&self, _key: &str, _size: usize) -> Result<Vec<i64>, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Rejected("namespace disabled".to_string()))
    }
}

struct Empty;

#[async_trait]
impl SequenceGenerator for Empty {
    async fn generate(&self, _key: &str, _size: usize) -> Result<Vec<i64>, GeneratorError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let generator = FlakyGenerator::new(4);
    let delegate = SequenceDelegate::new(generator.clone(), RetryPolicy::immediate(5));

    let ids = delegate.next_batch("key", 5).await.unwrap();

    assert_eq!(ids, vec![1000, 1001, 1002, 1003, 1004]);
    assert_eq!(generator.calls(), 5);
}

#[tokio::test]
async fn test_retry_waits_between_attempts() {
    let generator = FlakyGenerator::new(2);
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
    };
    let delegate = SequenceDelegate::new(generator.clone(), policy);

    let started = std::time::Instant::now();
    delegate.next_id("key").await.unwrap();

    // 20ms, then 40ms.
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_escalate() {
    let generator = FlakyGenerator::new(10);
    let delegate = SequenceDelegate::new(generator.clone(), RetryPolicy::immediate(3));

    let err = delegate.next_batch("key", 1).await.unwrap_err();

    let biz = err.as_business().unwrap();
    assert!(biz.is(ErrorCode::IdGenerateMaxRetry));
    assert!(biz.retryable);
    assert!(biz.source().is_some());
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let generator = Arc::new(Rejecting {
        calls: AtomicUsize::new(0),
    });
    let delegate = SequenceDelegate::new(generator.clone(), RetryPolicy::immediate(5));

    let err = delegate.next_batch("key", 1).await.unwrap_err();

    assert!(err.as_business().unwrap().is(ErrorCode::IdGenerateFailed));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_answer_fails() {
    let delegate = SequenceDelegate::new(Arc::new(Empty), RetryPolicy::immediate(5));
    let err = delegate.next_id("key").await.unwrap_err();
    assert!(err.as_business().unwrap().is(ErrorCode::IdGenerateFailed));
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_generator() {
    let generator = FlakyGenerator::new(0);
    let delegate = SequenceDelegate::new(generator.clone(), RetryPolicy::immediate(5));

    for (key, size) in [("", 1), ("   ", 1), ("key", 0)] {
        let err = delegate.next_batch(key, size).await.unwrap_err();
        assert!(err.as_business().unwrap().is(ErrorCode::InvalidParameter));
    }
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_acceptance_survives_flaky_generator() {
    let harness = Harness::with_generator(
        fast_config(),
        CountingGateway::approving(Channel::Bank),
        FlakyGenerator::new(2),
    );

    let model = harness
        .bus
        .send(accept("U1", dec!(5), Channel::Bank, NotifyChannel::Log))
        .await;

    assert!(model.success);
    assert_eq!(model.pay_order_no(), Some(1000));
}

#[tokio::test]
async fn test_acceptance_reports_generator_outage() {
    let config = OrchestratorConfig {
        id_max_attempts: 2,
        ..fast_config()
    };
    let harness = Harness::with_generator(
        config,
        CountingGateway::approving(Channel::Bank),
        FlakyGenerator::new(100),
    );

    let model = harness
        .bus
        .send(accept("U1", dec!(5), Channel::Bank, NotifyChannel::Log))
        .await;

    assert!(!model.success);
    assert_eq!(model.error_code.as_deref(), Some("E1002"));
    assert!(harness.repository.is_empty().await);
}
