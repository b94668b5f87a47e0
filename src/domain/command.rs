use super::money::Amount;
use super::order::{Channel, NotifyChannel};
use crate::error::{BizError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation discriminator of an inbound command.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Acceptance,
    Payment,
    Query,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Acceptance => f.write_str("acceptance"),
            OperationType::Payment => f.write_str("payment"),
            OperationType::Query => f.write_str("query"),
        }
    }
}

/// Fields every upstream request carries.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct BizHeader {
    pub sys_code: String,
    pub biz_identify_no: String,
    pub biz_unique_no: String,
}

impl BizHeader {
    pub fn new(
        sys_code: impl Into<String>,
        biz_identify_no: impl Into<String>,
        biz_unique_no: impl Into<String>,
    ) -> Self {
        Self {
            sys_code: sys_code.into(),
            biz_identify_no: biz_identify_no.into(),
            biz_unique_no: biz_unique_no.into(),
        }
    }

    /// Rejects headers with a blank field, since the business key is built from them.
    pub fn validate(&self) -> Result<(), BizError> {
        let fields = [
            ("sys_code", &self.sys_code),
            ("biz_identify_no", &self.biz_identify_no),
            ("biz_unique_no", &self.biz_unique_no),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(BizError::from(ErrorCode::InvalidParameter)
                .with_message(format!("{name} must not be blank"))),
            None => Ok(()),
        }
    }

    /// The idempotency key, `biz_identify_no:biz_unique_no`.
    pub fn biz_key(&self) -> String {
        Self::compose_key(&self.biz_identify_no, &self.biz_unique_no)
    }

    pub fn compose_key(biz_identify_no: &str, biz_unique_no: &str) -> String {
        format!("{biz_identify_no}:{biz_unique_no}")
    }
}

/// Accept a new payment order and drive it to completion.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AcceptOrder {
    pub header: BizHeader,
    pub amount: Amount,
    pub currency: String,
    pub channel: Channel,
    pub notify_channel: NotifyChannel,
}

/// Re-drive payment and notification of an already accepted order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RedrivePayment {
    pub header: BizHeader,
}

/// Look up the current state of an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct QueryOrder {
    pub header: BizHeader,
}

/// Every command the orchestrator understands.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Command {
    Acceptance(AcceptOrder),
    Payment(RedrivePayment),
    Query(QueryOrder),
}

impl Command {
    pub fn operation(&self) -> OperationType {
        match self {
            Command::Acceptance(_) => OperationType::Acceptance,
            Command::Payment(_) => OperationType::Payment,
            Command::Query(_) => OperationType::Query,
        }
    }

    pub fn header(&self) -> &BizHeader {
        match self {
            Command::Acceptance(order) => &order.header,
            Command::Payment(redrive) => &redrive.header,
            Command::Query(query) => &query.header,
        }
    }

    pub fn biz_key(&self) -> String {
        self.header().biz_key()
    }
}

impl From<AcceptOrder> for Command {
    fn from(order: AcceptOrder) -> Self {
        Command::Acceptance(order)
    }
}

impl From<RedrivePayment> for Command {
    fn from(redrive: RedrivePayment) -> Self {
        Command::Payment(redrive)
    }
}

impl From<QueryOrder> for Command {
    fn from(query: QueryOrder) -> Self {
        Command::Query(query)
    }
}
