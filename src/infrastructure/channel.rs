use crate::domain::order::{Channel, ChannelOutcome, ChannelRequest};
use crate::domain::ports::ChannelGateway;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

/// Stand-in for a real payment channel.
///
/// Approves every request, except those above the optional decline threshold.
#[derive(Debug, Clone)]
pub struct SimulatedChannelGateway {
    channel: Channel,
    decline_over: Option<Decimal>,
}

impl SimulatedChannelGateway {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            decline_over: None,
        }
    }

    pub fn declining_over(mut self, limit: Option<Decimal>) -> Self {
        self.decline_over = limit;
        self
    }
}

#[async_trait]
impl ChannelGateway for SimulatedChannelGateway {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn pay(&self, request: &ChannelRequest) -> Result<ChannelOutcome> {
        let outcome = match self.decline_over {
            Some(limit) if request.amount.value() > limit => ChannelOutcome::Failed {
                code: "LIMIT_EXCEEDED".to_string(),
                message: format!("amount above {limit}"),
            },
            _ => ChannelOutcome::Succeeded {
                channel_txn_id: format!("{}-{}", self.channel, request.request_no),
            },
        };
        debug!(
            channel = %self.channel,
            request_no = %request.request_no,
            ?outcome,
            "channel answered"
        );
        Ok(outcome)
    }
}
