//! Spot market-maker entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use spotmm_book::OrderBook;
use spotmm_bot::{init_logging, AppConfig};
use spotmm_exchange::{ExchangeClient, RestClient};
use spotmm_strategy::StrategyEngine;

/// Spot market maker for a single symbol.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SPOTMM_CONFIG).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("SPOTMM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::load(&config_path)?;

    let credentials = AppConfig::credentials()?;
    let client = Arc::new(RestClient::new(credentials, config.rest_url.clone())?);

    // Connectivity preflight before the loop starts trading.
    let server_time = client.server_time().await?;
    let round_trip = client
        .last_request_timing()
        .map(|timing| timing.total.as_millis() as u64)
        .unwrap_or_default();
    info!(server_time, round_trip_ms = round_trip, "Exchange connectivity check");

    let book = Arc::new(OrderBook::new(config.strategy.symbol.clone()));
    let mut engine = StrategyEngine::new(client, book, config.strategy)?;
    engine.run().await?;

    Ok(())
}
