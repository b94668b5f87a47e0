use payflow::application::redrive::{RedriveJob, RedriveSummary};
use payflow::application::wiring::{Collaborators, build_command_bus};
use payflow::domain::order::{Channel, NotifyChannel, NotifyStatus, PayStatus};
use payflow::domain::ports::{ChannelGatewayRef, OrderRepository};
use payflow::error::BizError;
use payflow::infrastructure::in_memory::{InMemoryOrderRepository, InMemorySequenceGenerator};
use payflow::infrastructure::lock::LocalLockManager;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{CountingGateway, CountingSink, accept, fast_config, redrive};

fn collaborators(
    repository: Arc<InMemoryOrderRepository>,
    bank: Arc<CountingGateway>,
    sink: Arc<CountingSink>,
) -> Collaborators {
    Collaborators {
        repository,
        generator: Arc::new(InMemorySequenceGenerator::new()),
        gateways: vec![bank as ChannelGatewayRef],
        sink,
        lock_manager: Arc::new(LocalLockManager::new()),
    }
}

#[tokio::test]
async fn test_redrive_finishes_orders_left_by_a_failed_channel() {
    let repository = Arc::new(InMemoryOrderRepository::new());
    let sink = Arc::new(CountingSink::default());

    let offline = CountingGateway::failing(Channel::Bank, BizError::new("E9001", "bank offline"));
    let bus = build_command_bus(
        &fast_config(),
        collaborators(repository.clone(), offline, sink.clone()),
    )
    .unwrap();
    for unique in ["U1", "U2"] {
        let model = bus
            .send(accept(unique, dec!(10), Channel::Bank, NotifyChannel::Publish))
            .await;
        assert_eq!(model.error_code.as_deref(), Some("E9001"));
    }
    assert_eq!(repository.find_unfinished(0, 10).await.unwrap().len(), 2);

    let online = CountingGateway::approving(Channel::Bank);
    let bus = build_command_bus(
        &fast_config(),
        collaborators(repository.clone(), online.clone(), sink.clone()),
    )
    .unwrap();
    let job = RedriveJob::new(repository.clone(), Arc::new(bus), 10);

    let summary = job.run_once().await.unwrap();
    assert_eq!(
        summary,
        RedriveSummary {
            scanned: 2,
            succeeded: 2,
            failed: 0,
            finished: 2,
        }
    );
    assert_eq!(online.calls(), 2);
    assert_eq!(sink.calls(), 2);

    let order = repository.find_by_biz_key("A1:U1").await.unwrap().unwrap();
    assert_eq!(order.status, PayStatus::Succeeded);
    assert_eq!(order.notify_status, NotifyStatus::Notified);

    // Nothing left to do on the next pass.
    assert_eq!(job.run_once().await.unwrap().scanned, 0);
}

#[tokio::test]
async fn test_redrive_command_on_finished_order_is_idempotent() {
    let repository = Arc::new(InMemoryOrderRepository::new());
    let bank = CountingGateway::approving(Channel::Bank);
    let sink = Arc::new(CountingSink::default());
    let bus = build_command_bus(
        &fast_config(),
        collaborators(repository, bank.clone(), sink.clone()),
    )
    .unwrap();

    bus.send(accept("U1", dec!(10), Channel::Bank, NotifyChannel::Publish))
        .await;
    let model = bus.send(redrive("U1")).await;

    assert!(model.success);
    assert!(model.idempotent);
    assert_eq!(bank.calls(), 1);
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn test_redrive_counts_failures() {
    let repository = Arc::new(InMemoryOrderRepository::new());
    let offline = CountingGateway::failing(Channel::Bank, BizError::new("E9001", "bank offline"));
    let bus = Arc::new(
        build_command_bus(
            &fast_config(),
            collaborators(
                repository.clone(),
                offline,
                Arc::new(CountingSink::default()),
            ),
        )
        .unwrap(),
    );
    bus.send(accept("U1", dec!(10), Channel::Bank, NotifyChannel::Log))
        .await;

    let summary = RedriveJob::new(repository, bus, 10).run_once().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.finished, 0);
}

#[tokio::test]
async fn test_redrive_pages_past_an_order_that_keeps_failing() {
    let repository = Arc::new(InMemoryOrderRepository::new());
    let sink = Arc::new(CountingSink::default());
    let wallet =
        CountingGateway::failing(Channel::Wallet, BizError::new("E9001", "wallet offline"));
    let bank = CountingGateway::recovering(Channel::Bank, Duration::ZERO);
    let bus = Arc::new(
        build_command_bus(
            &fast_config(),
            Collaborators {
                repository: repository.clone(),
                generator: Arc::new(InMemorySequenceGenerator::new()),
                gateways: vec![
                    wallet.clone() as ChannelGatewayRef,
                    bank.clone() as ChannelGatewayRef,
                ],
                sink: sink.clone(),
                lock_manager: Arc::new(LocalLockManager::new()),
            },
        )
        .unwrap(),
    );

    let stuck = bus
        .send(accept("U1", dec!(10), Channel::Wallet, NotifyChannel::Log))
        .await;
    assert_eq!(stuck.error_code.as_deref(), Some("E9001"));
    let recoverable = bus
        .send(accept("U2", dec!(10), Channel::Bank, NotifyChannel::Log))
        .await;
    assert_eq!(recoverable.error_code.as_deref(), Some("E9001"));

    let job = RedriveJob::new(repository.clone(), bus, 1);
    let first = job.run_once().await.unwrap();
    assert_eq!((first.scanned, first.failed), (1, 1));
    let second = job.run_once().await.unwrap();
    assert_eq!((second.scanned, second.finished), (1, 1));

    let order = repository.find_by_biz_key("A1:U2").await.unwrap().unwrap();
    assert_eq!(order.status, PayStatus::Succeeded);
    assert_eq!(bank.calls(), 2);

    // The cursor wraps back to the stuck order.
    assert_eq!(job.run_once().await.unwrap().scanned, 0);
    assert_eq!(job.run_once().await.unwrap().failed, 1);
    assert_eq!(wallet.calls(), 3);
}
