use super::command::{AcceptOrder, BizHeader};
use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment channel an order is routed to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Bank,
    Wallet,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Bank => f.write_str("bank"),
            Channel::Wallet => f.write_str("wallet"),
        }
    }
}

/// How the upstream system wants to hear about the final outcome.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    #[default]
    Publish,
    Log,
}

impl fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyChannel::Publish => f.write_str("publish"),
            NotifyChannel::Log => f.write_str("log"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayStatus {
    #[default]
    Accepted,
    Pending,
    Succeeded,
    Failed,
}

impl PayStatus {
    /// Succeeded and failed orders never go back to the channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayStatus::Succeeded | PayStatus::Failed)
    }
}

impl fmt::Display for PayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayStatus::Accepted => f.write_str("accepted"),
            PayStatus::Pending => f.write_str("pending"),
            PayStatus::Succeeded => f.write_str("succeeded"),
            PayStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStatus {
    #[default]
    Pending,
    Notified,
}

/// The primary payment entity.
///
/// Identified by `pay_order_no`, allocated during id generation, and unique on
/// its business key.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayOrder {
    pub pay_order_no: i64,
    pub sys_code: String,
    pub biz_identify_no: String,
    pub biz_unique_no: String,
    pub amount: Amount,
    pub currency: String,
    pub channel: Channel,
    pub notify_channel: NotifyChannel,
    pub status: PayStatus,
    pub notify_status: NotifyStatus,
    /// Incremented by every successful update.
    pub version: u32,
}

impl PayOrder {
    /// Builds a freshly accepted order from the inbound command.
    pub fn accepted(pay_order_no: i64, order: &AcceptOrder) -> Self {
        Self {
            pay_order_no,
            sys_code: order.header.sys_code.clone(),
            biz_identify_no: order.header.biz_identify_no.clone(),
            biz_unique_no: order.header.biz_unique_no.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            channel: order.channel,
            notify_channel: order.notify_channel,
            status: PayStatus::Accepted,
            notify_status: NotifyStatus::Pending,
            version: 0,
        }
    }

    pub fn biz_key(&self) -> String {
        BizHeader::compose_key(&self.biz_identify_no, &self.biz_unique_no)
    }

    pub fn header(&self) -> BizHeader {
        BizHeader::new(&self.sys_code, &self.biz_identify_no, &self.biz_unique_no)
    }

    /// Nothing left to do for this order: final status reached and announced.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() && self.notify_status == NotifyStatus::Notified
    }
}

/// The per-channel slice of a pay order. Orders are never split, so there is
/// exactly one per pay order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SubOrder {
    pub sub_order_no: String,
    pub pay_order_no: i64,
    pub channel: Channel,
    pub amount: Amount,
    pub status: PayStatus,
    pub version: u32,
}

impl SubOrder {
    pub fn for_order(order: &PayOrder) -> Self {
        Self {
            sub_order_no: format!("{}-01", order.pay_order_no),
            pay_order_no: order.pay_order_no,
            channel: order.channel,
            amount: order.amount,
            status: PayStatus::Accepted,
            version: 0,
        }
    }
}

/// The request sent to the payment channel, with whatever the channel answered.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ChannelRequest {
    pub request_no: String,
    pub pay_order_no: i64,
    pub sub_order_no: String,
    pub channel: Channel,
    pub amount: Amount,
    pub status: PayStatus,
    pub channel_txn_id: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub version: u32,
}

impl ChannelRequest {
    pub fn for_sub_order(sub_order: &SubOrder) -> Self {
        Self {
            request_no: format!("{}-R", sub_order.sub_order_no),
            pay_order_no: sub_order.pay_order_no,
            sub_order_no: sub_order.sub_order_no.clone(),
            channel: sub_order.channel,
            amount: sub_order.amount,
            status: PayStatus::Accepted,
            channel_txn_id: None,
            response_code: None,
            response_message: None,
            version: 0,
        }
    }
}

/// What a payment channel answered for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Succeeded { channel_txn_id: String },
    Failed { code: String, message: String },
    Pending,
}

impl ChannelOutcome {
    pub fn status(&self) -> PayStatus {
        match self {
            ChannelOutcome::Succeeded { .. } => PayStatus::Succeeded,
            ChannelOutcome::Failed { .. } => PayStatus::Failed,
            ChannelOutcome::Pending => PayStatus::Pending,
        }
    }
}

/// Announcement of a final payment status to the upstream system.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentNotification {
    pub pay_order_no: i64,
    pub sys_code: String,
    pub biz_key: String,
    pub status: PayStatus,
    pub amount: Amount,
    pub currency: String,
}

impl From<&PayOrder> for PaymentNotification {
    fn from(order: &PayOrder) -> Self {
        Self {
            pay_order_no: order.pay_order_no,
            sys_code: order.sys_code.clone(),
            biz_key: order.biz_key(),
            status: order.status,
            amount: order.amount,
            currency: order.currency.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> PayOrder {
        let command = AcceptOrder {
            header: BizHeader::new("SYS", "A1", "U1"),
            amount: Amount::new(dec!(10.00)).unwrap(),
            currency: "EUR".to_string(),
            channel: Channel::Wallet,
            notify_channel: NotifyChannel::Log,
        };
        PayOrder::accepted(42, &command)
    }

    #[test]
    fn test_accepted_order_derivations() {
        let order = order();
        assert_eq!(order.biz_key(), "A1:U1");
        assert_eq!(order.status, PayStatus::Accepted);

        let sub_order = SubOrder::for_order(&order);
        assert_eq!(sub_order.sub_order_no, "42-01");
        assert_eq!(sub_order.channel, Channel::Wallet);

        let request = ChannelRequest::for_sub_order(&sub_order);
        assert_eq!(request.request_no, "42-01-R");
        assert_eq!(request.pay_order_no, 42);
    }

    #[test]
    fn test_finished_requires_terminal_and_notified() {
        let mut order = order();
        assert!(!order.is_finished());
        order.status = PayStatus::Succeeded;
        assert!(!order.is_finished());
        order.notify_status = NotifyStatus::Notified;
        assert!(order.is_finished());
    }
}
