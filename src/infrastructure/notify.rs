use crate::domain::order::PaymentNotification;
use crate::domain::ports::NotificationSink;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Publishes notifications as structured `info` events.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink {
    published: AtomicU64,
}

impl LoggingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn publish(&self, notification: &PaymentNotification) -> Result<()> {
        info!(
            pay_order_no = notification.pay_order_no,
            sys_code = %notification.sys_code,
            biz_key = %notification.biz_key,
            status = %notification.status,
            amount = %notification.amount,
            currency = %notification.currency,
            "payment notification published"
        );
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
