//! The four phases of the transaction pipeline and their strategies.

pub mod acceptance;
pub mod id_generation;
pub mod notification;
pub mod payment;

use crate::domain::context::TransactionContext;
use crate::domain::phase::OrderBundle;
use crate::domain::ports::OrderRepository;
use crate::error::{BizError, ErrorCode, Result};

pub use acceptance::{AcceptanceActivity, SyncAcceptanceStrategy};
pub use id_generation::{IdGenerationActivity, SequenceStrategy};
pub use notification::{LogNotificationStrategy, NotificationActivity, PublishNotificationStrategy};
pub use payment::{ChannelPaymentStrategy, PaymentActivity};

/// Reads the current stored state of the order the context is working on.
pub(crate) async fn reload(
    repository: &dyn OrderRepository,
    ctx: &TransactionContext,
) -> Result<OrderBundle> {
    let pay_order_no = ctx
        .pay_order()
        .map(|order| order.pay_order_no)
        .ok_or_else(|| not_found(&ctx.biz_key()))?;
    let pay_order = repository
        .find_by_pay_order_no(pay_order_no)
        .await?
        .ok_or_else(|| not_found(&ctx.biz_key()))?;
    repository
        .load_bundle(pay_order)
        .await?
        .ok_or_else(|| not_found(&ctx.biz_key()))
}

pub(crate) fn not_found(biz_key: &str) -> crate::error::PaymentError {
    BizError::from(ErrorCode::OrderNotFound)
        .with_message(format!("no order stored for {biz_key}"))
        .into()
}
