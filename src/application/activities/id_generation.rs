use crate::application::activity::{Activity, Strategy, StrategySet};
use crate::application::sequence::SequenceDelegate;
use crate::domain::context::TransactionContext;
use crate::domain::order::{ChannelRequest, PayOrder, SubOrder};
use crate::domain::phase::{
    IdGenRequest, OrderBundle, Phase, PhaseRequest, PhaseResponse, StrategyKind,
};
use crate::domain::ports::OrderRepositoryRef;
use crate::error::{BizError, ErrorCode, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Allocates the pay order number and drafts the order records.
pub struct IdGenerationActivity {
    namespace: String,
    repository: OrderRepositoryRef,
    strategies: StrategySet,
}

impl IdGenerationActivity {
    pub fn new(
        namespace: impl Into<String>,
        repository: OrderRepositoryRef,
        strategies: StrategySet,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            repository,
            strategies,
        }
    }
}

#[async_trait]
impl Activity for IdGenerationActivity {
    fn phase(&self) -> Phase {
        Phase::IdGeneration
    }

    fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    async fn pre_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        if ctx.pay_order().is_some() {
            ctx.complete_phase(Phase::IdGeneration);
            return Ok(());
        }
        // A stored order keeps the number it was given the first time.
        if let Some(existing) = self.repository.find_by_biz_key(&ctx.biz_key()).await? {
            debug!(
                biz_key = %ctx.biz_key(),
                pay_order_no = existing.pay_order_no,
                "reusing stored pay order number"
            );
            match self.repository.load_bundle(existing.clone()).await? {
                Some(orders) => ctx.load(orders),
                None => ctx.set_pay_order(existing),
            }
            ctx.complete_phase(Phase::IdGeneration);
        }
        Ok(())
    }

    fn assemble(&self, _ctx: &TransactionContext) -> Result<PhaseRequest> {
        Ok(PhaseRequest::IdGeneration(IdGenRequest {
            namespace: self.namespace.clone(),
            size: 1,
        }))
    }

    fn decide_strategy(&self, _ctx: &TransactionContext) -> Result<StrategyKind> {
        Ok(StrategyKind::Sequence)
    }

    async fn post_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let ids = &ctx.slot(Phase::IdGeneration).response.id_generation()?.ids;
        let pay_order_no = match ids.as_slice() {
            [id] if *id > 0 => *id,
            [id] => {
                return Err(BizError::from(ErrorCode::IdGenerateInvalid)
                    .with_message(format!("generated identifier {id} is not positive"))
                    .into());
            }
            other => {
                return Err(BizError::from(ErrorCode::IdGenerateInvalid)
                    .with_message(format!("expected one identifier, got {}", other.len()))
                    .into());
            }
        };

        let intake = ctx.intake().ok_or_else(|| {
            BizError::from(ErrorCode::InvalidParameter)
                .with_message("order details missing from the command")
        })?;
        let pay_order = PayOrder::accepted(pay_order_no, intake);
        let sub_order = SubOrder::for_order(&pay_order);
        let channel_request = ChannelRequest::for_sub_order(&sub_order);
        ctx.load(OrderBundle {
            pay_order,
            sub_order,
            channel_request,
        });
        Ok(())
    }
}

/// Draws identifiers from the sequence delegate.
pub struct SequenceStrategy {
    delegate: Arc<SequenceDelegate>,
}

impl SequenceStrategy {
    pub fn new(delegate: Arc<SequenceDelegate>) -> Self {
        Self { delegate }
    }
}

#[async_trait]
impl Strategy for SequenceStrategy {
    fn identity(&self) -> StrategyKind {
        StrategyKind::Sequence
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
        let request = request.id_generation()?;
        let ids = self
            .delegate
            .next_batch(&request.namespace, request.size)
            .await?;
        response.id_generation_mut()?.ids = ids;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::{AcceptOrder, BizHeader};
    use crate::domain::money::Amount;
    use crate::domain::order::{Channel, NotifyChannel};
    use crate::domain::phase::PhaseState;
    use crate::infrastructure::in_memory::InMemoryOrderRepository;
    use rust_decimal_macros::dec;

    /// Answers with a fixed list of identifiers.
    struct FixedIds(Vec<i64>);

    #[async_trait]
    impl Strategy for FixedIds {
        fn identity(&self) -> StrategyKind {
            StrategyKind::Sequence
        }

        async fn execute(&self, _: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
            response.id_generation_mut()?.ids = self.0.clone();
            Ok(())
        }
    }

    fn ctx() -> TransactionContext {
        TransactionContext::for_acceptance(AcceptOrder {
            header: BizHeader::new("SYS", "A1", "U1"),
            amount: Amount::new(dec!(25.00)).unwrap(),
            currency: "EUR".to_string(),
            channel: Channel::Bank,
            notify_channel: NotifyChannel::Publish,
        })
    }

    fn activity(ids: Vec<i64>) -> IdGenerationActivity {
        IdGenerationActivity::new(
            "pay_order_no",
            Arc::new(InMemoryOrderRepository::new()),
            StrategySet::default().with(Arc::new(FixedIds(ids))),
        )
    }

    #[tokio::test]
    async fn test_allocates_and_drafts_orders() {
        let ctx = activity(vec![1001]).execute(ctx()).await.unwrap();

        assert_eq!(ctx.phase_state(Phase::IdGeneration), PhaseState::Complete);
        let orders = ctx.orders().unwrap();
        assert_eq!(orders.pay_order.pay_order_no, 1001);
        assert_eq!(orders.sub_order.pay_order_no, 1001);
        assert_eq!(orders.channel_request.sub_order_no, "1001-01");
    }

    #[tokio::test]
    async fn test_rejects_wrong_identifier_count() {
        let err = activity(vec![1, 2]).execute(ctx()).await.unwrap_err();
        assert!(err.as_business().unwrap().is(ErrorCode::IdGenerateInvalid));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_identifier() {
        let err = activity(vec![0]).execute(ctx()).await.unwrap_err();
        assert!(err.as_business().unwrap().is(ErrorCode::IdGenerateInvalid));
    }
}
