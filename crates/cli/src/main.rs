mod config;
mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use nordnet_holdings_core::models::snapshot::HoldingsSnapshot;
use nordnet_holdings_core::providers::nordnet::{NordnetProvider, BASE_URL};
use nordnet_holdings_core::providers::traits::BrokerProvider;
use nordnet_holdings_core::registry::CoordinatorRegistry;
use nordnet_holdings_core::HoldingsCoordinator;

#[derive(Debug, Parser)]
#[command(
    name = "nordnet-holdings",
    version,
    about = "Keep the holdings of Nordnet accounts up to date"
)]
struct Cli {
    /// JSON file mapping entry ids to account options.
    #[arg(
        long,
        global = true,
        env = "NORDNET_HOLDINGS_CONFIG",
        default_value = "nordnet_holdings.json"
    )]
    config: PathBuf,

    /// Nordnet site to talk to, e.g. https://www.nordnet.se.
    #[arg(long, global = true, env = "NORDNET_BASE_URL", default_value = BASE_URL)]
    base_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll every configured account until interrupted (default if no subcommand given).
    Run,

    /// Log in to every account and print its currency, or the setup error code.
    Check,

    /// Refresh every account once and print the positions as JSON.
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();
    let registry = build_registry(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&registry).await,
        Commands::Check => check(&registry).await,
        Commands::Once => once(&registry).await,
    }
}

fn build_registry(cli: &Cli) -> Result<CoordinatorRegistry> {
    let entries = config::load_entries(&cli.config)?;
    let provider: Arc<dyn BrokerProvider> =
        Arc::new(NordnetProvider::with_base_url(cli.base_url.clone()));

    let mut registry = CoordinatorRegistry::new();
    for (entry_id, options) in &entries {
        let coordinator = HoldingsCoordinator::from_options(provider.clone(), options)
            .with_context(|| format!("Invalid options for entry '{entry_id}'"))?;
        registry.insert(entry_id.clone(), coordinator);
    }
    info!(entries = registry.len(), provider = provider.name(), "Loaded accounts");
    Ok(registry)
}

async fn run(registry: &CoordinatorRegistry) -> Result<()> {
    for entry_id in registry.entry_ids() {
        let Some(coordinator) = registry.get(&entry_id) else {
            continue;
        };

        // A failed setup is not fatal: the first refresh discovers the currency.
        match coordinator.setup().await {
            Ok(details) => {
                info!(entry = %entry_id, currency = %details.account_currency, "Account ready")
            }
            Err(err) => warn!(
                entry = %entry_id,
                code = err.setup_error_code(),
                error = %err,
                "Account setup failed"
            ),
        }

        let entry = entry_id.clone();
        coordinator.subscribe(Arc::new(move |snapshot: &Arc<HoldingsSnapshot>| {
            info!(entry = %entry, positions = snapshot.len(), "Holdings updated");
            for position in snapshot.positions() {
                debug!(
                    entry = %entry,
                    entity_id = %position.entity_id(),
                    price = position.position_market_price,
                    currency = %position.position_currency,
                    roi = position.account_roi,
                    "Position"
                );
            }
        }));

        coordinator.start();
        coordinator.trigger_now();
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    registry.stop_all();
    Ok(())
}

async fn check(registry: &CoordinatorRegistry) -> Result<()> {
    let mut failed = 0;
    for entry_id in registry.entry_ids() {
        let Some(coordinator) = registry.get(&entry_id) else {
            continue;
        };
        match coordinator.setup().await {
            Ok(details) => println!("{entry_id}: ok, account currency {}", details.account_currency),
            Err(err) => {
                failed += 1;
                println!("{entry_id}: {} ({err})", err.setup_error_code());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} accounts failed validation", registry.len());
    }
    Ok(())
}

async fn once(registry: &CoordinatorRegistry) -> Result<()> {
    let mut report = Map::new();
    for entry_id in registry.entry_ids() {
        let Some(coordinator) = registry.get(&entry_id) else {
            continue;
        };
        let value = match coordinator.refresh().await {
            Ok(snapshot) => json!({
                "fetched_at": snapshot.fetched_at(),
                "positions": snapshot.positions(),
            }),
            Err(err) => {
                warn!(entry = %entry_id, error = %err, "Refresh failed");
                json!({ "error": err.to_string() })
            }
        };
        report.insert(entry_id, value);
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(report))?);
    Ok(())
}
