use super::bus::CommandBus;
use crate::domain::command::RedrivePayment;
use crate::domain::ports::OrderRepositoryRef;
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, warn};

/// What one re-drive pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedriveSummary {
    pub scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Orders that are now terminal and announced.
    pub finished: usize,
}

/// Batch job pushing unfinished orders through payment and notification again.
///
/// Every order goes through the bus as a regular `Payment` command, so each
/// phase re-checks stored state before doing anything.
///
/// Passes page through the unfinished orders by pay order number. A pass that
/// reaches the end of the table wraps the cursor, so an order that keeps failing
/// cannot hold back the ones behind it.
pub struct RedriveJob {
    repository: OrderRepositoryRef,
    bus: Arc<CommandBus>,
    batch_size: usize,
    cursor: AtomicI64,
}

impl RedriveJob {
    pub fn new(repository: OrderRepositoryRef, bus: Arc<CommandBus>, batch_size: usize) -> Self {
        Self {
            repository,
            bus,
            batch_size,
            cursor: AtomicI64::new(0),
        }
    }

    pub async fn run_once(&self) -> Result<RedriveSummary> {
        let after = self.cursor.load(Ordering::Acquire);
        let unfinished = self
            .repository
            .find_unfinished(after, self.batch_size)
            .await?;
        let next = match unfinished.last() {
            Some(last) if unfinished.len() >= self.batch_size => last.pay_order_no,
            _ => 0,
        };
        self.cursor.store(next, Ordering::Release);
        let mut summary = RedriveSummary {
            scanned: unfinished.len(),
            ..RedriveSummary::default()
        };

        for order in unfinished {
            let command = RedrivePayment {
                header: order.header(),
            };
            let model = self.bus.send(command.into()).await;
            if model.success {
                summary.succeeded += 1;
                if model.pay_order.as_ref().is_some_and(|o| o.is_finished()) {
                    summary.finished += 1;
                }
            } else {
                summary.failed += 1;
                warn!(
                    pay_order_no = order.pay_order_no,
                    error_code = ?model.error_code,
                    "re-drive failed"
                );
            }
        }

        info!(
            after,
            scanned = summary.scanned,
            succeeded = summary.succeeded,
            failed = summary.failed,
            finished = summary.finished,
            "re-drive pass complete"
        );
        Ok(summary)
    }
}
