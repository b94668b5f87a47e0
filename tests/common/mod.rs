#![allow(dead_code)]

use async_trait::async_trait;
use payflow::application::bus::CommandBus;
use payflow::application::wiring::{Collaborators, build_command_bus};
use payflow::config::OrchestratorConfig;
use payflow::domain::command::{AcceptOrder, BizHeader, Command, QueryOrder, RedrivePayment};
use payflow::domain::money::Amount;
use payflow::domain::order::{
    Channel, ChannelOutcome, ChannelRequest, NotifyChannel, PaymentNotification,
};
use payflow::domain::ports::{
    ChannelGateway, ChannelGatewayRef, GeneratorError, NotificationSink, SequenceGenerator,
};
use payflow::error::{BizError, Result};
use payflow::infrastructure::in_memory::{InMemoryOrderRepository, InMemorySequenceGenerator};
use payflow::infrastructure::lock::LocalLockManager;
use rand::Rng;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn accept(unique: &str, amount: Decimal, channel: Channel, notify: NotifyChannel) -> Command {
    AcceptOrder {
        header: BizHeader::new("SYS", "A1", unique),
        amount: Amount::new(amount).unwrap(),
        currency: "EUR".to_string(),
        channel,
        notify_channel: notify,
    }
    .into()
}

pub fn redrive(unique: &str) -> Command {
    RedrivePayment {
        header: BizHeader::new("SYS", "A1", unique),
    }
    .into()
}

pub fn query(unique: &str) -> Command {
    QueryOrder {
        header: BizHeader::new("SYS", "A1", unique),
    }
    .into()
}

/// Configuration with no retry delays.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        id_retry_initial_delay_ms: 0,
        id_retry_max_delay_ms: 0,
        ..OrchestratorConfig::default()
    }
}

/// A gateway that counts its calls and answers from a script.
pub struct CountingGateway {
    channel: Channel,
    calls: AtomicUsize,
    failure: Option<BizError>,
    failing_calls: usize,
    delay: Duration,
}

impl CountingGateway {
    pub fn approving(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            calls: AtomicUsize::new(0),
            failure: None,
            failing_calls: 0,
            delay: Duration::ZERO,
        })
    }

    pub fn failing(channel: Channel, failure: BizError) -> Arc<Self> {
        Arc::new(Self {
            channel,
            calls: AtomicUsize::new(0),
            failure: Some(failure),
            failing_calls: usize::MAX,
            delay: Duration::ZERO,
        })
    }

    /// Fails the first call, then approves after `delay`.
    pub fn recovering(channel: Channel, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            calls: AtomicUsize::new(0),
            failure: Some(BizError::new("E9001", "bank offline")),
            failing_calls: 1,
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelGateway for CountingGateway {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn pay(&self, request: &ChannelRequest) -> Result<ChannelOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(failure) = &self.failure
            && call <= self.failing_calls
        {
            return Err(BizError::new(failure.code.clone(), failure.message.clone()).into());
        }
        tokio::time::sleep(self.delay).await;
        Ok(ChannelOutcome::Succeeded {
            channel_txn_id: format!("txn-{}", request.request_no),
        })
    }
}

#[derive(Default)]
pub struct CountingSink {
    calls: AtomicUsize,
}

impl CountingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn publish(&self, _notification: &PaymentNotification) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Times out on the first `failures` calls, then hands out increasing ids.
pub struct FlakyGenerator {
    failures: usize,
    calls: AtomicUsize,
    inner: InMemorySequenceGenerator,
}

impl FlakyGenerator {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            inner: InMemorySequenceGenerator::starting_at(1000),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceGenerator for FlakyGenerator {
    async fn generate(
        &self,
        key: &str,
        size: usize,
    ) -> std::result::Result<Vec<i64>, GeneratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(GeneratorError::Timeout(format!("attempt {call}")));
        }
        self.inner.generate(key, size).await
    }
}

/// Everything a test needs to look behind the bus.
pub struct Harness {
    pub bus: CommandBus,
    pub repository: Arc<InMemoryOrderRepository>,
    pub bank: Arc<CountingGateway>,
    pub sink: Arc<CountingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(fast_config(), CountingGateway::approving(Channel::Bank))
    }

    pub fn with(config: OrchestratorConfig, bank: Arc<CountingGateway>) -> Self {
        Self::with_generator(config, bank, Arc::new(InMemorySequenceGenerator::new()))
    }

    pub fn with_generator(
        config: OrchestratorConfig,
        bank: Arc<CountingGateway>,
        generator: Arc<dyn SequenceGenerator>,
    ) -> Self {
        let repository = Arc::new(InMemoryOrderRepository::new());
        let sink = Arc::new(CountingSink::default());
        let deps = Collaborators {
            repository: repository.clone(),
            generator,
            gateways: vec![bank.clone() as ChannelGatewayRef],
            sink: sink.clone(),
            lock_manager: Arc::new(LocalLockManager::new()),
        };
        let bus = build_command_bus(&config, deps).unwrap();
        Self {
            bus,
            repository,
            bank,
            sink,
        }
    }
}

/// Writes `rows` acceptance commands with random amounts and channels.
pub fn generate_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    let mut rng = rand::thread_rng();

    wtr.write_record([
        "op",
        "sys_code",
        "biz_identify_no",
        "biz_unique_no",
        "amount",
        "currency",
        "channel",
        "notify",
    ])?;

    for i in 1..=rows {
        let cents: u32 = rng.gen_range(1..1_000_000);
        let channel = if rng.gen_bool(0.5) { "bank" } else { "wallet" };
        let unique = format!("U{i}");
        let amount = format!("{}.{:02}", cents / 100, cents % 100);
        wtr.write_record([
            "acceptance",
            "SYS",
            "A1",
            unique.as_str(),
            amount.as_str(),
            "EUR",
            channel,
            "log",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
