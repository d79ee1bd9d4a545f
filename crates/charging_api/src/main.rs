use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use charging_api::{app_state::AppState, config::AppConfig, create_app};
use charging_core::BookingStore;
use charging_engine::{Engine, http::HttpChargingService};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Command line arguments for the charging booking server
#[derive(Parser, Debug)]
#[command(name = "charging-api")]
#[command(about = "EV charging booking and session server")]
struct Args {
    /// Path to the server configuration JSON file
    #[arg(short, long)]
    config: PathBuf,

    /// Port to bind the server to
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let config = AppConfig::load(&args.config).await?;
    tracing::info!(
        "Loaded config from {}: {} stations, operator at {}",
        args.config.display(),
        config.stations.len(),
        config.remote.base_url
    );

    let remote = Arc::new(HttpChargingService::new(&config.remote));
    let engine = Engine::new(
        BookingStore::default(),
        remote,
        config.stations.clone(),
        Arc::new(config.catalog()),
        config.battery_capacity_kwh,
        config.cadence,
    );
    let app = create_app(AppState::new(engine));

    let bind_addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
