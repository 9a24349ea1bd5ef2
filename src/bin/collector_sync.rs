use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use collector_sync::application::services::PlatformSignal;
use collector_sync::domain::entities::PaymentPayload;
use collector_sync::domain::value_objects::{
    Amount, CollectorId, GatewayStatusCode, GeoPoint, IdempotencyKey, PayerIdentity,
    ReferenceCode, RevenueCode,
};
use collector_sync::state::AppState;
use collector_sync::{init_logging, AppConfig, DEFAULT_LOG_FILTER};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "collector-sync")]
#[command(about = "Offline payment queue and gateway reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database URL
    #[arg(long, env = "COLLECTOR_DATABASE_URL")]
    database_url: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background sync loop until Ctrl+C
    Run,
    /// Probe connectivity and drain the queue once
    Sync,
    /// Print the queue summary
    Status,
    /// List every stored transaction
    List,
    /// Show one transaction and its payment reference
    Show { key: String },
    /// Capture a payment into the offline queue
    Enqueue {
        #[arg(long)]
        payer_name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Amount in naira
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        revenue_code: String,
        #[arg(long, env = "COLLECTOR_ID")]
        collector_id: String,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
    },
    /// Give a flagged transaction a fresh attempt budget
    Requeue { key: String },
    /// Delete a flagged or declined transaction
    Purge { key: String },
    /// Apply a status pushed by the gateway
    Confirm { reference: String, status: String },
    /// Install and activate the offline resource cache
    InstallCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(DEFAULT_LOG_FILTER, cli.json_logs);

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let state = AppState::new(config).await?;
    let result = dispatch(&state, cli.command).await;
    state.shutdown().await;
    result
}

async fn dispatch(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Run => run(state).await,
        Commands::Sync => {
            state.connectivity.refresh().await;
            match state.reconciler.drain().await? {
                Some(report) => print_json(&report),
                None => {
                    warn!("another drain is already running");
                    Ok(())
                }
            }
        }
        Commands::Status => print_json(&state.read_model.snapshot().await?),
        Commands::List => print_json(&state.queue.list_all().await?),
        Commands::Show { key } => {
            let key = parse_key(&key)?;
            match state.read_model.transaction_status(&key).await? {
                Some(view) => print_json(&view),
                None => anyhow::bail!("transaction {key} not found"),
            }
        }
        Commands::Enqueue {
            payer_name,
            phone,
            email,
            amount,
            revenue_code,
            collector_id,
            latitude,
            longitude,
        } => {
            let location = match (latitude, longitude) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon, None).map_err(anyhow::Error::msg)?),
                _ => None,
            };
            let payload = PaymentPayload {
                payer: PayerIdentity::new(payer_name, phone, email).map_err(anyhow::Error::msg)?,
                amount: Amount::from_naira(amount).map_err(anyhow::Error::msg)?,
                revenue_code: RevenueCode::new(revenue_code).map_err(anyhow::Error::msg)?,
                collector_id: CollectorId::new(collector_id).map_err(anyhow::Error::msg)?,
                location,
                captured_at: Utc::now(),
            };
            let key = state.queue.enqueue(payload).await?;
            println!("{key}");
            Ok(())
        }
        Commands::Requeue { key } => {
            state.queue.requeue_for_review(&parse_key(&key)?).await?;
            Ok(())
        }
        Commands::Purge { key } => {
            state.queue.purge(&parse_key(&key)?).await?;
            Ok(())
        }
        Commands::Confirm { reference, status } => {
            let reference = ReferenceCode::new(reference).map_err(anyhow::Error::msg)?;
            let outcome = state
                .reconciler
                .apply_confirmation(&reference, GatewayStatusCode::new(status))
                .await?;
            print_json(&outcome)
        }
        Commands::InstallCache => {
            let entries = state.cache.install().await?;
            let purged = state.cache.activate().await?;
            info!(entries, purged = purged.len(), "offline cache ready");
            Ok(())
        }
    }
}

async fn run(state: &AppState) -> Result<()> {
    info!("Starting collector-sync v{}", env!("CARGO_PKG_VERSION"));

    if state.cache.active_generation().await.as_ref() != Some(state.cache.generation()) {
        // 失敗しても同期は止めない
        match state.cache.install().await {
            Ok(_) => {
                state.cache.activate().await?;
            }
            Err(err) => warn!(error = %err, "offline cache install failed; keeping previous generation"),
        }
    }

    let cancel = CancellationToken::new();
    let poller = state.connectivity.spawn_polling(
        std::time::Duration::from_secs(state.config.connectivity.poll_interval),
        cancel.clone(),
    );
    let scheduler = if state.config.sync.auto_sync {
        Some(state.scheduler().spawn(cancel.clone()))
    } else {
        None
    };

    state
        .connectivity
        .report_platform_signal(PlatformSignal::Online)
        .await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutting down collector-sync...");

    cancel.cancel();
    poller.await?;
    if let Some(handle) = scheduler {
        handle.await?;
    }
    Ok(())
}

fn parse_key(value: &str) -> Result<IdempotencyKey> {
    IdempotencyKey::parse(value).map_err(anyhow::Error::msg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
