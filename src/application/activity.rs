//! Phase controllers and the strategies they pick from.
//!
//! An [`Activity`] owns one phase of the pipeline. Running it goes through a fixed
//! sequence: `pre_execution` checks durable state and may finish the phase early,
//! `real_execute` builds the phase request and runs the strategies matching the
//! decided [`StrategyKind`], `post_execution` validates what they produced and
//! folds it back into the context.

use crate::domain::context::TransactionContext;
use crate::domain::phase::{Phase, PhaseRequest, PhaseResponse, PhaseState, StrategyKind};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One implementation of one operation variant for one phase.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn identity(&self) -> StrategyKind;

    fn is_support(&self, kind: StrategyKind) -> bool {
        self.identity() == kind
    }

    async fn execute(&self, request: &PhaseRequest, response: &mut PhaseResponse) -> Result<()>;
}

pub type StrategyRef = Arc<dyn Strategy>;

/// The candidate strategies of a phase, in registration order.
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: Vec<StrategyRef>,
}

impl StrategySet {
    pub fn new(strategies: Vec<StrategyRef>) -> Self {
        Self { strategies }
    }

    pub fn with(mut self, strategy: StrategyRef) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Executes every strategy supporting `kind` and returns how many ran.
    ///
    /// Zero matches is not an error: the response is left as it was.
    pub async fn run(
        &self,
        kind: StrategyKind,
        request: &PhaseRequest,
        response: &mut PhaseResponse,
    ) -> Result<usize> {
        let mut executed = 0;
        for strategy in self.strategies.iter().filter(|s| s.is_support(kind)) {
            strategy.execute(request, response).await?;
            executed += 1;
        }
        if executed == 0 {
            debug!(strategy = %kind, "no strategy supports the decided kind");
        }
        Ok(executed)
    }
}

#[async_trait]
pub trait Activity: Send + Sync {
    fn phase(&self) -> Phase;

    fn strategies(&self) -> &StrategySet;

    /// Idempotency and consistency checks. Completing the phase here skips execution.
    async fn pre_execution(&self, ctx: &mut TransactionContext) -> Result<()>;

    /// Builds this phase's request from the context.
    fn assemble(&self, ctx: &TransactionContext) -> Result<PhaseRequest>;

    /// Picks the strategy kind using only what is known before the phase runs.
    fn decide_strategy(&self, ctx: &TransactionContext) -> Result<StrategyKind>;

    /// Validates the phase response and writes its results into the context.
    async fn post_execution(&self, ctx: &mut TransactionContext) -> Result<()>;

    async fn real_execute(&self, ctx: &mut TransactionContext) -> Result<()> {
        let phase = self.phase();
        let request = self.assemble(ctx)?;
        let kind = self.decide_strategy(ctx)?;
        let slot = ctx.slot_mut(phase);
        self.strategies()
            .run(kind, &request, &mut slot.response)
            .await?;
        slot.request = Some(request);
        Ok(())
    }

    /// Runs the phase and hands the context back.
    ///
    /// A phase that is already complete, or a context that is, is passed through
    /// without touching any strategy.
    async fn execute(&self, mut ctx: TransactionContext) -> Result<TransactionContext> {
        let phase = self.phase();
        if ctx.phase_state(phase).is_complete() {
            debug!(%phase, "phase already complete");
            return Ok(ctx);
        }
        if ctx.is_complete() {
            ctx.complete_phase(phase);
            debug!(%phase, biz_key = %ctx.biz_key(), "transaction already complete");
            return Ok(ctx);
        }

        self.pre_execution(&mut ctx).await?;
        if ctx.is_complete() {
            ctx.complete_phase(phase);
        }
        if ctx.phase_state(phase).is_complete() {
            debug!(%phase, biz_key = %ctx.biz_key(), "phase satisfied by pre-check");
            return Ok(ctx);
        }
        ctx.advance(phase, PhaseState::PreChecked);

        self.real_execute(&mut ctx).await?;
        ctx.advance(phase, PhaseState::Executed);

        self.post_execution(&mut ctx).await?;
        ctx.advance(phase, PhaseState::PostChecked);
        ctx.complete_phase(phase);
        Ok(ctx)
    }
}

pub type ActivityRef = Arc<dyn Activity>;

/// Activities run strictly one after another on the same context.
#[derive(Clone, Default)]
pub struct Pipeline {
    activities: Vec<ActivityRef>,
}

impl Pipeline {
    pub fn new(activities: Vec<ActivityRef>) -> Self {
        Self { activities }
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.activities.iter().map(|a| a.phase()).collect()
    }

    /// Stops at the first failing phase; completed phases are not compensated.
    pub async fn run(&self, ctx: TransactionContext) -> Result<TransactionContext> {
        let mut ctx = ctx;
        for activity in &self.activities {
            ctx = activity.execute(ctx).await?;
        }
        Ok(ctx)
    }
}
