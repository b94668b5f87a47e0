use crate::application::activity::{Activity, Strategy, StrategySet};
use crate::domain::context::TransactionContext;
use crate::domain::order::{Channel, ChannelOutcome};
use crate::domain::phase::{
    OrderBundle, Phase, PhaseRequest, PhaseResponse, Settlement, StrategyKind,
};
use crate::domain::ports::{ChannelGatewayRef, OrderRepositoryRef};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{not_found, reload};

/// Sends the order to its payment channel and records the answer.
pub struct PaymentActivity {
    repository: OrderRepositoryRef,
    strategies: StrategySet,
}

impl PaymentActivity {
    pub fn new(repository: OrderRepositoryRef, strategies: StrategySet) -> Self {
        Self {
            repository,
            strategies,
        }
    }

    async fn reconcile(&self, orders: OrderBundle) -> Result<OrderBundle> {
        let OrderBundle {
            mut pay_order,
            mut sub_order,
            channel_request,
        } = orders;
        let status = channel_request.status;
        warn!(
            pay_order_no = pay_order.pay_order_no,
            %status,
            "channel answer not applied to the order, reconciling"
        );
        if sub_order.status != status {
            sub_order.status = status;
            sub_order = self.repository.update_sub_order(&sub_order).await?;
        }
        pay_order.status = status;
        let pay_order = self.repository.update_pay_order(&pay_order).await?;
        Ok(OrderBundle {
            pay_order,
            sub_order,
            channel_request,
        })
    }
}

#[async_trait]
impl Activity for PaymentActivity {
    fn phase(&self) -> Phase {
        Phase::Payment
    }

    fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    /// A channel answer that was recorded without reaching the pay order is copied
    /// onto it instead of paying again.
    async fn pre_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let mut orders = reload(self.repository.as_ref(), ctx).await?;
        let answered = orders.channel_request.status.is_terminal();
        if answered && !orders.pay_order.status.is_terminal() {
            orders = self.reconcile(orders).await?;
        }
        let status = orders.pay_order.status;
        let finished = orders.pay_order.is_finished();
        ctx.load(orders);
        if status.is_terminal() {
            if finished {
                ctx.mark_idempotent();
                ctx.mark_complete();
            }
            ctx.complete_phase(Phase::Payment);
        }
        Ok(())
    }

    fn assemble(&self, ctx: &TransactionContext) -> Result<PhaseRequest> {
        Ok(PhaseRequest::Payment(ctx.orders()?))
    }

    /// Routes by the channel the order was accepted for.
    fn decide_strategy(&self, ctx: &TransactionContext) -> Result<StrategyKind> {
        let channel: Channel = ctx
            .pay_order()
            .map(|order| order.channel)
            .ok_or_else(|| not_found(&ctx.biz_key()))?;
        Ok(StrategyKind::Pay(channel))
    }

    async fn post_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let settlement = ctx
            .slot(Phase::Payment)
            .response
            .payment()?
            .settlement
            .clone();
        match settlement {
            Some(settlement) => {
                info!(
                    biz_key = %ctx.biz_key(),
                    pay_order_no = settlement.orders.pay_order.pay_order_no,
                    status = %settlement.orders.pay_order.status,
                    "payment settled"
                );
                ctx.load(settlement.orders);
            }
            None => {
                warn!(
                    biz_key = %ctx.biz_key(),
                    "no payment strategy for channel, order left for re-drive"
                );
            }
        }
        Ok(())
    }
}

/// Pays through one channel gateway.
pub struct ChannelPaymentStrategy {
    gateway: ChannelGatewayRef,
    repository: OrderRepositoryRef,
}

impl ChannelPaymentStrategy {
    pub fn new(gateway: ChannelGatewayRef, repository: OrderRepositoryRef) -> Self {
        Self {
            gateway,
            repository,
        }
    }
}

#[async_trait]
impl Strategy for ChannelPaymentStrategy {
    fn identity(&self) -> StrategyKind {
        StrategyKind::Pay(self.gateway.channel())
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
        let orders = request.payment()?;
        let outcome = self.gateway.pay(&orders.channel_request).await?;
        let status = outcome.status();

        let mut channel_request = orders.channel_request.clone();
        channel_request.status = status;
        match &outcome {
            ChannelOutcome::Succeeded { channel_txn_id } => {
                channel_request.channel_txn_id = Some(channel_txn_id.clone());
            }
            ChannelOutcome::Failed { code, message } => {
                channel_request.response_code = Some(code.clone());
                channel_request.response_message = Some(message.clone());
            }
            ChannelOutcome::Pending => {}
        }
        let channel_request = self
            .repository
            .update_channel_request(&channel_request)
            .await?;

        let mut sub_order = orders.sub_order.clone();
        sub_order.status = status;
        let sub_order = self.repository.update_sub_order(&sub_order).await?;

        let mut pay_order = orders.pay_order.clone();
        pay_order.status = status;
        let pay_order = self.repository.update_pay_order(&pay_order).await?;

        response.payment_mut()?.settlement = Some(Settlement {
            outcome,
            orders: OrderBundle {
                pay_order,
                sub_order,
                channel_request,
            },
        });
        Ok(())
    }
}
