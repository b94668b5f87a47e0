use crate::application::activity::{Activity, Strategy, StrategySet};
use crate::domain::context::TransactionContext;
use crate::domain::phase::{AcceptOutcome, Phase, PhaseRequest, PhaseResponse, StrategyKind};
use crate::domain::ports::OrderRepositoryRef;
use crate::error::{ErrorCode, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::not_found;

/// Persists a newly allocated order, or recognizes a replay of one.
pub struct AcceptanceActivity {
    repository: OrderRepositoryRef,
    strategies: StrategySet,
}

impl AcceptanceActivity {
    pub fn new(repository: OrderRepositoryRef, strategies: StrategySet) -> Self {
        Self {
            repository,
            strategies,
        }
    }

    /// Switches the context over to the order stored under its business key.
    async fn adopt_stored(&self, ctx: &mut TransactionContext) -> Result<bool> {
        let Some(existing) = self.repository.find_by_biz_key(&ctx.biz_key()).await? else {
            return Ok(false);
        };
        let finished = existing.is_finished();
        match self.repository.load_bundle(existing.clone()).await? {
            Some(orders) => ctx.load(orders),
            None => ctx.set_pay_order(existing),
        }
        ctx.mark_idempotent();
        if finished {
            ctx.mark_complete();
        }
        Ok(true)
    }
}

#[async_trait]
impl Activity for AcceptanceActivity {
    fn phase(&self) -> Phase {
        Phase::Acceptance
    }

    fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    async fn pre_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        if self.adopt_stored(ctx).await? {
            info!(
                biz_key = %ctx.biz_key(),
                finished = ctx.is_complete(),
                "order already accepted"
            );
            ctx.complete_phase(Phase::Acceptance);
        }
        Ok(())
    }

    fn assemble(&self, ctx: &TransactionContext) -> Result<PhaseRequest> {
        Ok(PhaseRequest::Acceptance(ctx.orders()?))
    }

    fn decide_strategy(&self, _ctx: &TransactionContext) -> Result<StrategyKind> {
        Ok(StrategyKind::SyncAcceptance)
    }

    async fn post_execution(&self, ctx: &mut TransactionContext) -> Result<()> {
        let outcome = ctx.slot(Phase::Acceptance).response.acceptance()?.outcome;
        match outcome {
            Some(AcceptOutcome::Persisted) => {
                info!(
                    biz_key = %ctx.biz_key(),
                    pay_order_no = ?ctx.pay_order().map(|o| o.pay_order_no),
                    "order accepted"
                );
            }
            Some(AcceptOutcome::Duplicate) => {
                // A concurrent writer got there first; continue with its order.
                if !self.adopt_stored(ctx).await? {
                    return Err(not_found(&ctx.biz_key()));
                }
                info!(biz_key = %ctx.biz_key(), "lost acceptance race, adopting stored order");
            }
            None => {
                warn!(biz_key = %ctx.biz_key(), "no acceptance strategy ran");
            }
        }
        Ok(())
    }
}

/// Stores pay order, sub-order and channel request in one atomic write.
pub struct SyncAcceptanceStrategy {
    repository: OrderRepositoryRef,
}

impl SyncAcceptanceStrategy {
    pub fn new(repository: OrderRepositoryRef) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Strategy for SyncAcceptanceStrategy {
    fn identity(&self) -> StrategyKind {
        StrategyKind::SyncAcceptance
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()> {
        let orders = request.acceptance()?;
        let outcome = match self.repository.insert_accepted(orders).await {
            Ok(()) => AcceptOutcome::Persisted,
            Err(err)
                if err
                    .as_business()
                    .is_some_and(|e| e.is(ErrorCode::DuplicateOrder)) =>
            {
                AcceptOutcome::Duplicate
            }
            Err(err) => return Err(err),
        };
        response.acceptance_mut()?.outcome = Some(outcome);
        Ok(())
    }
}
