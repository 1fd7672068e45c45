use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use birthday_scheduler::{
    config::Config,
    database::{
        Database,
        repositories::{DeliveryLedgerSeaOrmRepository, PersonSeaOrmRepository},
    },
    job_scheduling::{
        DeliveryWorker, InMemoryJobQueue, JobQueueRunner, JobScheduler, QueueOptions,
        ReconciliationService,
    },
    observability::{LogFormat, init_logging},
    repositories::{DeliveryLedger, PersonStore},
    services::LogNotifier,
    utils::{Clock, SystemClock},
};

#[derive(Parser)]
#[command(name = "birthday-scheduler")]
#[command(version)]
#[command(about = "Sends birthday greetings at 09:00 local time, exactly once per day")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (falls back to CONFIG_FILE, then config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format (text, json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    info!("Starting Birthday Scheduler v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load_from_file(path)?;
            info!("Configuration loaded from: {}", path);
            config
        }
        None => Config::load()?,
    };

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let persons: Arc<dyn PersonStore> =
        Arc::new(PersonSeaOrmRepository::new(database.connection()));
    let ledger: Arc<dyn DeliveryLedger> =
        Arc::new(DeliveryLedgerSeaOrmRepository::new(database.connection()));
    let queue = Arc::new(InMemoryJobQueue::with_options(QueueOptions {
        remove_on_complete: config.delivery.remove_on_complete,
        remove_on_fail: config.delivery.remove_on_fail,
    }));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = Arc::new(
        JobScheduler::new(queue.clone(), ledger.clone(), persons.clone(), clock.clone())
            .with_retry_policy(config.delivery.retry_policy())
            .with_operation_timeout(config.scheduler.operation_timeout),
    );
    info!("Job scheduler initialized");

    let worker = Arc::new(DeliveryWorker::new(
        scheduler.clone(),
        ledger,
        persons.clone(),
        Arc::new(LogNotifier),
    ));
    let runner = JobQueueRunner::new(queue.clone(), worker, clock, &config.delivery);
    let reconciliation = ReconciliationService::new(
        scheduler,
        queue,
        persons,
        config.reconciliation.clone(),
        config.scheduler.reconcile_page_size,
    );

    let cancellation_token = CancellationToken::new();

    let runner_token = cancellation_token.clone();
    let runner_handle = tokio::spawn(async move { runner.run(runner_token).await });

    let reconciliation_token = cancellation_token.clone();
    let reconciliation_handle =
        tokio::spawn(async move { reconciliation.run(reconciliation_token).await });

    info!("Birthday scheduler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    cancellation_token.cancel();

    for (name, handle) in [
        ("job queue runner", runner_handle),
        ("reconciliation service", reconciliation_handle),
    ] {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("The {} stopped with an error: {}", name, e),
            Err(e) => error!("The {} task panicked: {}", name, e),
        }
    }

    info!("Birthday scheduler stopped");
    Ok(())
}
