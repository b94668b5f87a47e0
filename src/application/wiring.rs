use super::activities::{
    AcceptanceActivity, ChannelPaymentStrategy, IdGenerationActivity, LogNotificationStrategy,
    NotificationActivity, PaymentActivity, PublishNotificationStrategy, SequenceStrategy,
    SyncAcceptanceStrategy,
};
use super::activity::{ActivityRef, Pipeline, StrategyRef, StrategySet};
use super::bus::CommandBus;
use super::handlers::{AcceptanceHandler, PaymentHandler, QueryHandler};
use super::sequence::{RetryPolicy, SequenceDelegate};
use crate::config::OrchestratorConfig;
use crate::domain::lock::LockManagerRef;
use crate::domain::ports::{
    ChannelGatewayRef, NotificationSinkRef, OrderRepositoryRef, SequenceGeneratorRef,
};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// The outside world the orchestrator is wired against.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: OrderRepositoryRef,
    pub generator: SequenceGeneratorRef,
    pub gateways: Vec<ChannelGatewayRef>,
    pub sink: NotificationSinkRef,
    pub lock_manager: LockManagerRef,
}

impl From<&OrchestratorConfig> for RetryPolicy {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.id_max_attempts,
            initial_delay: Duration::from_millis(config.id_retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.id_retry_max_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

/// Builds every activity and handler and freezes them into a bus.
pub fn build_command_bus(config: &OrchestratorConfig, deps: Collaborators) -> Result<CommandBus> {
    let repository = deps.repository;
    let delegate = Arc::new(SequenceDelegate::new(deps.generator, config.into()));

    let id_generation: ActivityRef = Arc::new(IdGenerationActivity::new(
        config.sequence_namespace.clone(),
        repository.clone(),
        StrategySet::default().with(Arc::new(SequenceStrategy::new(delegate))),
    ));
    let acceptance: ActivityRef = Arc::new(AcceptanceActivity::new(
        repository.clone(),
        StrategySet::default().with(Arc::new(SyncAcceptanceStrategy::new(repository.clone()))),
    ));
    let payment: ActivityRef = Arc::new(PaymentActivity::new(
        repository.clone(),
        StrategySet::new(
            deps.gateways
                .into_iter()
                .map(|gateway| {
                    Arc::new(ChannelPaymentStrategy::new(gateway, repository.clone()))
                        as StrategyRef
                })
                .collect(),
        ),
    ));
    let notification: ActivityRef = Arc::new(NotificationActivity::new(
        repository.clone(),
        StrategySet::default()
            .with(Arc::new(PublishNotificationStrategy::new(deps.sink)))
            .with(Arc::new(LogNotificationStrategy)),
    ));

    let mut acceptance_handler = AcceptanceHandler::new(Pipeline::new(vec![
        id_generation,
        acceptance,
        payment.clone(),
        notification.clone(),
    ]));
    let mut payment_handler =
        PaymentHandler::new(repository.clone(), Pipeline::new(vec![payment, notification]));
    // Acceptance and re-drive lock the same business-key names.
    if config.serialize_by_biz_key {
        let options = config.lock_options();
        acceptance_handler = acceptance_handler.serialized(deps.lock_manager.clone(), options);
        payment_handler = payment_handler.serialized(deps.lock_manager, options);
    }

    CommandBus::builder()
        .register(Arc::new(acceptance_handler))
        .register(Arc::new(payment_handler))
        .register(Arc::new(QueryHandler::new(repository)))
        .build()
}
