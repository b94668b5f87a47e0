use super::activities::not_found;
use super::activity::Pipeline;
use super::bus::CommandHandler;
use crate::domain::command::{Command, OperationType};
use crate::domain::context::TransactionContext;
use crate::domain::lock::{LockManagerRef, LockOptions, with_lock};
use crate::domain::model::TransactionModel;
use crate::domain::ports::OrderRepositoryRef;
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use async_trait::async_trait;

fn unexpected(expected: OperationType, command: &Command) -> PaymentError {
    BizError::from(ErrorCode::InvalidOperation)
        .with_message(format!(
            "{expected} handler cannot serve {}",
            command.operation()
        ))
        .into()
}

/// Accepts a new order and drives it through every phase.
pub struct AcceptanceHandler {
    pipeline: Pipeline,
    lock: Option<(LockManagerRef, LockOptions)>,
}

impl AcceptanceHandler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            lock: None,
        }
    }

    /// Runs the pipeline under a lock named by the business key.
    pub fn serialized(mut self, manager: LockManagerRef, options: LockOptions) -> Self {
        self.lock = Some((manager, options));
        self
    }
}

#[async_trait]
impl CommandHandler for AcceptanceHandler {
    fn operation(&self) -> OperationType {
        OperationType::Acceptance
    }

    async fn handle(&self, command: Command) -> Result<TransactionModel> {
        let order = match command {
            Command::Acceptance(order) => order,
            other => return Err(unexpected(OperationType::Acceptance, &other)),
        };
        let ctx = TransactionContext::for_acceptance(order);
        let ctx = match &self.lock {
            Some((manager, options)) => {
                let name = ctx.biz_key();
                with_lock(manager.as_ref(), &name, *options, self.pipeline.run(ctx)).await?
            }
            None => self.pipeline.run(ctx).await?,
        };
        Ok(ctx.into_model())
    }
}

/// Re-drives payment and notification of an order that was already accepted.
pub struct PaymentHandler {
    repository: OrderRepositoryRef,
    pipeline: Pipeline,
    lock: Option<(LockManagerRef, LockOptions)>,
}

impl PaymentHandler {
    pub fn new(repository: OrderRepositoryRef, pipeline: Pipeline) -> Self {
        Self {
            repository,
            pipeline,
            lock: None,
        }
    }

    /// Runs the lookup and the pipeline under a lock named by the business key.
    pub fn serialized(mut self, manager: LockManagerRef, options: LockOptions) -> Self {
        self.lock = Some((manager, options));
        self
    }

    async fn redrive(&self, biz_key: &str) -> Result<TransactionModel> {
        let pay_order = self
            .repository
            .find_by_biz_key(biz_key)
            .await?
            .ok_or_else(|| not_found(biz_key))?;
        let orders = self
            .repository
            .load_bundle(pay_order)
            .await?
            .ok_or_else(|| not_found(biz_key))?;

        let ctx = TransactionContext::for_existing(OperationType::Payment, orders);
        let ctx = self.pipeline.run(ctx).await?;
        Ok(ctx.into_model())
    }
}

#[async_trait]
impl CommandHandler for PaymentHandler {
    fn operation(&self) -> OperationType {
        OperationType::Payment
    }

    async fn handle(&self, command: Command) -> Result<TransactionModel> {
        let redrive = match command {
            Command::Payment(redrive) => redrive,
            other => return Err(unexpected(OperationType::Payment, &other)),
        };
        let biz_key = redrive.header.biz_key();
        match &self.lock {
            Some((manager, options)) => {
                with_lock(manager.as_ref(), &biz_key, *options, self.redrive(&biz_key)).await
            }
            None => self.redrive(&biz_key).await,
        }
    }
}

/// Reports the stored state of an order.
pub struct QueryHandler {
    repository: OrderRepositoryRef,
}

impl QueryHandler {
    pub fn new(repository: OrderRepositoryRef) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CommandHandler for QueryHandler {
    fn operation(&self) -> OperationType {
        OperationType::Query
    }

    async fn handle(&self, command: Command) -> Result<TransactionModel> {
        let query = match command {
            Command::Query(query) => query,
            other => return Err(unexpected(OperationType::Query, &other)),
        };
        let biz_key = query.header.biz_key();
        let pay_order = self
            .repository
            .find_by_biz_key(&biz_key)
            .await?
            .ok_or_else(|| not_found(&biz_key))?;
        Ok(TransactionModel::succeeded(Some(pay_order)))
    }
}
