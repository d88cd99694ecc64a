//! Algorand ledger monitor
//!
//! Runs the subscriptions declared in the config file against an Algorand
//! indexer and logs every delta, or performs one-shot account lookups.

use algorand_monitor::adapters::{open_store, IndexerClient};
use algorand_monitor::config::MonitorConfig;
use algorand_monitor::core::LedgerQueryPort;
use algorand_monitor::domain::{created_assets, interacted_accounts, TimeFrame};
use algorand_monitor::{SubscriptionEvent, SubscriptionManager};
use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "algorand-monitor")]
#[command(about = "Incremental Algorand ledger subscriptions")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "monitor.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured subscriptions until Ctrl+C (default)
    Watch,
    /// List assets created by an account
    Assets { address: String },
    /// List accounts an address has paid recently
    Receivers {
        address: String,
        /// day, week, month or year
        #[arg(long, default_value = "week")]
        range: TimeFrame,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_missing = !std::path::Path::new(&cli.config).exists();
    let mut config = if config_missing {
        MonitorConfig::default()
    } else {
        MonitorConfig::from_file(&cli.config)?
    };

    // Override log level if provided
    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    init_logging(&config)?;
    if config_missing {
        warn!("Config file not found, using defaults: {}", cli.config);
    }

    info!("Indexer endpoint: {}", config.indexer.endpoint());

    config.validate()?;
    config.ensure_directories()?;
    info!("Configuration validated successfully");

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let client: Arc<dyn LedgerQueryPort> = Arc::new(IndexerClient::from_config(&config.indexer)?);

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(config, client).await,
        Command::Assets { address } => {
            let assets = created_assets(client.as_ref(), &address).await?;
            for asset in &assets {
                println!(
                    "{:>12}  {:<8}  {:<32}  total={} decimals={}{}",
                    asset.index,
                    asset.unit_name.as_deref().unwrap_or("-"),
                    asset.name.as_deref().unwrap_or("-"),
                    asset.total,
                    asset.decimals,
                    if asset.deleted { " (deleted)" } else { "" }
                );
            }
            info!("{} assets created by {}", assets.len(), address);
            Ok(())
        }
        Command::Receivers { address, range } => {
            let receivers = interacted_accounts(client.as_ref(), &address, range).await?;
            for account in &receivers.accounts {
                println!("{}", account);
            }
            info!(
                "{} accounts paid by {} in the last {}",
                receivers.accounts.len(),
                address,
                range
            );
            if receivers.truncated {
                warn!("Listing is partial; try a shorter --range");
            }
            Ok(())
        }
    }
}

async fn watch(config: MonitorConfig, client: Arc<dyn LedgerQueryPort>) -> Result<()> {
    if config.subscriptions.is_empty() {
        warn!("No [[subscriptions]] configured; nothing to watch");
        return Ok(());
    }

    let store = open_store(&config.storage)?;
    let manager = SubscriptionManager::new(client, store, config.engine.clone());

    let mut health = manager.health_events();
    tokio::spawn(async move {
        while let Ok(signal) = health.recv().await {
            warn!("Health of {}: {:?}", signal.subscription_id, signal.status);
        }
    });

    for sub in &config.subscriptions {
        let id = manager.create_named(&sub.name, sub.kind, &sub.filter_input(), sub.poll_interval_secs)?;

        let name = sub.name.clone();
        let mut events = manager.subscribe_stream(&id)?;
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(SubscriptionEvent::Delta(batch)) => {
                        for record in &batch.records {
                            info!(
                                subscription = %name,
                                id = %record.id,
                                tx_type = %record.tx_type,
                                sender = %record.sender,
                                receiver = record.receiver.as_deref().unwrap_or("-"),
                                amount = record.amount.unwrap_or_default(),
                                "New transaction"
                            );
                        }
                    }
                    Ok(SubscriptionEvent::QueryFailed { error, consecutive_failures, .. }) => {
                        warn!(subscription = %name, consecutive_failures, "Query failed: {}", error);
                    }
                    Ok(SubscriptionEvent::Health(_)) => {}
                    Err(e) => warn!(subscription = %name, "Observer lagging: {}", e),
                }
            }
        });

        if sub.start {
            manager.start(&id)?;
        }
    }

    info!(
        "Monitoring {} subscriptions ({} active). Press Ctrl+C to shutdown.",
        manager.len(),
        manager.active_count()
    );

    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Received shutdown signal");
    manager.shutdown().await;
    info!("Shutting down Algorand monitor");
    Ok(())
}

fn init_logging(config: &MonitorConfig) -> Result<()> {
    let log_level = config
        .monitoring
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("algorand_monitor={}", log_level).into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}
