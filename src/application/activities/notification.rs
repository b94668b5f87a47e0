use crate::application::activity::{Activity, Strategy, StrategySet};
use crate::domain::context::TransactionContext;
use crate::domain::order::{NotifyChannel, NotifyStatus};
use crate::domain::phase::{NotifyRequest, Phase, PhaseRequest, PhaseResponse, StrategyKind};
use crate::domain::ports::{NotificationSinkRef, OrderRepositoryRef};
use crate::error::{BizError, ErrorCode, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{not_found, reload};

/// Announces a final payment status once.
pub struct NotificationActivity {
    repository: OrderRepositoryRef,
    strategies: StrategySet,
}

impl NotificationActivity {
    pub fn new(repository: OrderRepositoryRef, strategies: StrategySet) -> Self {
        Self {
            repository,
            strategies,
        }
    }
}

#[async_trait]
impl Activity for NotificationActivity {
    fn phase(&self) -> Phase {
        Phase::Notification
    }

    fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    async fn pre_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let orders = reload(self.repository.as_ref(), ctx).await?;
        let status = orders.pay_order.status;
        let notify_status = orders.pay_order.notify_status;
        ctx.load(orders);
        if !status.is_terminal() {
            debug!(biz_key = %ctx.biz_key(), %status, "nothing to announce yet");
            ctx.complete_phase(Phase::Notification);
        } else if notify_status == NotifyStatus::Notified {
            ctx.complete_phase(Phase::Notification);
        }
        Ok(())
    }

    fn assemble(&self, ctx: &TransactionContext) -> Result<PhaseRequest> {
        let order = ctx.pay_order().ok_or_else(|| not_found(&ctx.biz_key()))?;
        Ok(PhaseRequest::Notification(NotifyRequest {
            channel: order.notify_channel,
            notification: order.into(),
        }))
    }

    /// Routes by the notify channel the upstream system asked for.
    fn decide_strategy(&self, ctx: &TransactionContext) -> Result<StrategyKind> {
        let order = ctx.pay_order().ok_or_else(|| not_found(&ctx.biz_key()))?;
        Ok(StrategyKind::Notify(order.notify_channel))
    }

    async fn post_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let delivered_via = ctx
            .slot(Phase::Notification)
            .response
            .notification()?
            .delivered_via;
        let Some(channel) = delivered_via else {
            warn!(biz_key = %ctx.biz_key(), "no notification strategy ran");
            return Ok(());
        };

        let mut order = ctx
            .pay_order()
            .cloned()
            .ok_or_else(|| not_found(&ctx.biz_key()))?;
        order.notify_status = NotifyStatus::Notified;
        let stored = self.repository.update_pay_order(&order).await?;
        debug!(biz_key = %ctx.biz_key(), %channel, "outcome announced");
        ctx.set_pay_order(stored);
        Ok(())
    }
}

/// Hands the notification to the publication sink.
pub struct PublishNotificationStrategy {
    sink: NotificationSinkRef,
}

impl PublishNotificationStrategy {
    pub fn new(sink: NotificationSinkRef) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Strategy for PublishNotificationStrategy {
    fn identity(&self) -> StrategyKind {
        StrategyKind::Notify(NotifyChannel::Publish)
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
        let request = request.notification()?;
        match self.sink.publish(&request.notification).await {
            Ok(()) => {}
            Err(err) if err.is_structured() => return Err(err),
            Err(err) => {
                return Err(BizError::from(ErrorCode::NotifyFailed)
                    .with_message(format!(
                        "could not publish outcome of {}",
                        request.notification.pay_order_no
                    ))
                    .with_cause(err)
                    .into());
            }
        }
        response.notification_mut()?.delivered_via = Some(NotifyChannel::Publish);
        Ok(())
    }
}

/// Records the outcome in the service log only.
pub struct LogNotificationStrategy;

#[async_trait]
impl Strategy for LogNotificationStrategy {
    fn identity(&self) -> StrategyKind {
        StrategyKind::Notify(NotifyChannel::Log)
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
        let notification = &request.notification()?.notification;
        info!(
            pay_order_no = notification.pay_order_no,
            sys_code = %notification.sys_code,
            biz_key = %notification.biz_key,
            status = %notification.status,
            amount = %notification.amount,
            currency = %notification.currency,
            "payment outcome"
        );
        response.notification_mut()?.delivered_via = Some(NotifyChannel::Log);
        Ok(())
    }
}
