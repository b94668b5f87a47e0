use super::order::{
    Channel, ChannelOutcome, ChannelRequest, PayOrder, PaymentNotification, SubOrder,
};
use super::phase::OrderBundle;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Durable storage for orders and their channel requests.
///
/// Implementations must enforce uniqueness of the business key and reject updates
/// whose `version` does not match the stored one.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores all three records of a new order atomically.
    ///
    /// Fails with `ErrorCode::DuplicateOrder` when the business key is taken.
    async fn insert_accepted(&self, orders: &OrderBundle) -> Result<()>;
    async fn find_by_biz_key(&self, biz_key: &str) -> Result<Option<PayOrder>>;
    async fn find_by_pay_order_no(&self, pay_order_no: i64) -> Result<Option<PayOrder>>;
    async fn find_sub_order(&self, pay_order_no: i64) -> Result<Option<SubOrder>>;
    async fn find_channel_request(&self, pay_order_no: i64) -> Result<Option<ChannelRequest>>;
    /// Returns the stored record with its bumped version.
    async fn update_pay_order(&self, order: &PayOrder) -> Result<PayOrder>;
    async fn update_sub_order(&self, sub_order: &SubOrder) -> Result<SubOrder>;
    async fn update_channel_request(&self, request: &ChannelRequest) -> Result<ChannelRequest>;
    /// Orders numbered above `after` that still need payment or notification, in
    /// number order.
    async fn find_unfinished(&self, after: i64, limit: usize) -> Result<Vec<PayOrder>>;

    /// Loads all three records of an order.
    async fn load_bundle(&self, pay_order: PayOrder) -> Result<Option<OrderBundle>> {
        let sub_order = self.find_sub_order(pay_order.pay_order_no).await?;
        let channel_request = self.find_channel_request(pay_order.pay_order_no).await?;
        Ok(match (sub_order, channel_request) {
            (Some(sub_order), Some(channel_request)) => Some(OrderBundle {
                pay_order,
                sub_order,
                channel_request,
            }),
            _ => None,
        })
    }
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("sequence backend timed out: {0}")]
    Timeout(String),
    #[error("sequence backend unavailable: {0}")]
    Unavailable(String),
    #[error("sequence request rejected: {0}")]
    Rejected(String),
}

impl GeneratorError {
    /// Timeouts and outages are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeneratorError::Timeout(_) | GeneratorError::Unavailable(_))
    }
}

/// Backend producing unique, roughly time-ordered identifiers.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn generate(
        &self,
        key: &str,
        size: usize,
    ) -> std::result::Result<Vec<i64>, GeneratorError>;
}

/// A payment channel (bank, wallet provider).
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    fn channel(&self) -> Channel;
    async fn pay(&self, request: &ChannelRequest) -> Result<ChannelOutcome>;
}

/// Where final payment statuses are announced.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &PaymentNotification) -> Result<()>;
}

pub type OrderRepositoryRef = Arc<dyn OrderRepository>;
pub type SequenceGeneratorRef = Arc<dyn SequenceGenerator>;
pub type ChannelGatewayRef = Arc<dyn ChannelGateway>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
