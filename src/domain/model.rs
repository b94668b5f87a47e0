use super::order::PayOrder;
use crate::error::{BizError, ErrorCode};
use serde::{Deserialize, Serialize};

/// The result of dispatching one command.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct TransactionModel {
    pub success: bool,
    /// The command replayed work that was already done.
    pub idempotent: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub pay_order: Option<PayOrder>,
}

impl TransactionModel {
    pub fn succeeded(pay_order: Option<PayOrder>) -> Self {
        Self {
            success: true,
            pay_order,
            ..Self::default()
        }
    }

    pub fn failed(err: &BizError) -> Self {
        Self {
            success: false,
            error_code: Some(err.code.clone()),
            error_message: Some(err.message.clone()),
            ..Self::default()
        }
    }

    /// Fallback for unknown operations and for failures without a stable code.
    pub fn invalid_operation() -> Self {
        Self::failed(&ErrorCode::InvalidOperation.into())
    }

    pub fn pay_order_no(&self) -> Option<i64> {
        self.pay_order.as_ref().map(|order| order.pay_order_no)
    }
}
