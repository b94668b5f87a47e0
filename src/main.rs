use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::redrive::RedriveJob;
use payflow::application::wiring::{Collaborators, build_command_bus};
use payflow::config::{IdGeneratorKind, OrchestratorConfig};
use payflow::domain::order::Channel;
use payflow::domain::ports::{ChannelGatewayRef, OrderRepositoryRef, SequenceGeneratorRef};
use payflow::infrastructure::channel::SimulatedChannelGateway;
use payflow::infrastructure::in_memory::{InMemoryOrderRepository, InMemorySequenceGenerator};
use payflow::infrastructure::lock::LocalLockManager;
use payflow::infrastructure::notify::LoggingNotificationSink;
use payflow::infrastructure::snowflake::TimeOrderedSequenceGenerator;
use payflow::interfaces::csv::command_reader::CommandReader;
use payflow::interfaces::csv::result_writer::ResultWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON configuration file. `PAYFLOW_*` environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// After processing the input, push unfinished orders through payment again.
    #[arg(long)]
    redrive: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn in_memory_storage() -> (OrderRepositoryRef, SequenceGeneratorRef) {
    let repository: OrderRepositoryRef = Arc::new(InMemoryOrderRepository::new());
    let generator: SequenceGeneratorRef = Arc::new(InMemorySequenceGenerator::new());
    (repository, generator)
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<PathBuf>) -> Result<(OrderRepositoryRef, SequenceGeneratorRef)> {
    use payflow::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            let repository: OrderRepositoryRef = Arc::new(store.clone());
            let generator: SequenceGeneratorRef = Arc::new(store);
            Ok((repository, generator))
        }
        None => Ok(in_memory_storage()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<PathBuf>) -> Result<(OrderRepositoryRef, SequenceGeneratorRef)> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = OrchestratorConfig::load(cli.config.as_deref()).into_diagnostic()?;

    let (repository, mut generator) = open_storage(cli.db_path)?;
    if config.id_generator == IdGeneratorKind::TimeOrdered {
        let time_ordered: SequenceGeneratorRef =
            Arc::new(TimeOrderedSequenceGenerator::new(config.worker_id).into_diagnostic()?);
        generator = time_ordered;
    }
    let gateways: Vec<ChannelGatewayRef> = [Channel::Bank, Channel::Wallet]
        .into_iter()
        .map(|channel| {
            Arc::new(SimulatedChannelGateway::new(channel).declining_over(config.decline_over))
                as ChannelGatewayRef
        })
        .collect();
    let deps = Collaborators {
        repository: repository.clone(),
        generator,
        gateways,
        sink: Arc::new(LoggingNotificationSink::new()),
        lock_manager: Arc::new(LocalLockManager::new()),
    };
    let bus = Arc::new(build_command_bus(&config, deps).into_diagnostic()?);

    let file = File::open(cli.input).into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = ResultWriter::new(stdout.lock());
    for row in CommandReader::new(file).commands() {
        match row {
            Ok(command) => {
                let model = bus.send(command.clone()).await;
                writer.write(&command, &model).into_diagnostic()?;
            }
            Err(e) => {
                error!(error = %e, "Error reading command");
            }
        }
    }
    writer.flush().into_diagnostic()?;

    if cli.redrive {
        let job = RedriveJob::new(repository, Arc::clone(&bus), config.redrive_batch_size);
        let summary = job.run_once().await.into_diagnostic()?;
        info!(?summary, "re-drive finished");
    }

    Ok(())
}
