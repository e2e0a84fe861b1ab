use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use polywatch::models::Timeframe;
use polywatch::monitor::{MonitorConfig, ReferencePriceMonitor, TimeframeMonitor};
use polywatch::recorder::session::SessionManager;
use polywatch::scrapers::clob::HttpMarketData;
use polywatch::scrapers::gamma::GammaDiscovery;
use polywatch::scrapers::{InstrumentSource, MarketData};

#[derive(Parser)]
#[command(name = "polywatch", about = "Polymarket bitcoin up/down market recorder")]
struct Args {
    /// Base directory session data is written under
    #[arg(long, env = "DATA_DIR", default_value = "data_monitor")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the recording daemon (default)
    Monitor,
    /// Print the currently active instrument per timeframe and exit
    Markets,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("polywatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build HTTP client")
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG set there reaches the filter
    let env_loaded = dotenv::dotenv().is_ok();
    init_tracing();
    if env_loaded {
        info!("Loaded environment from .env");
    }
    let args = Args::parse();

    match args.command.unwrap_or(Command::Monitor) {
        Command::Monitor => run_monitor(args.data_dir).await,
        Command::Markets => list_markets().await,
    }
}

async fn run_monitor(data_dir: PathBuf) -> Result<()> {
    let client = http_client()?;
    let discovery: Arc<dyn InstrumentSource> = Arc::new(GammaDiscovery::new(client.clone()));
    let data: Arc<dyn MarketData> = Arc::new(HttpMarketData::new(client));
    let sessions = Arc::new(SessionManager::new(&data_dir));

    info!("🚀 polywatch starting");
    info!(data_dir = %data_dir.display(), "Session data directory");

    for timeframe in Timeframe::ALL {
        let monitor = TimeframeMonitor::new(
            timeframe,
            discovery.clone(),
            data.clone(),
            sessions.clone(),
            MonitorConfig::default(),
        );
        tokio::spawn(monitor.run());
    }
    tokio::spawn(ReferencePriceMonitor::new(data, sessions, MonitorConfig::default()).run());

    tokio::signal::ctrl_c()
        .await
        .context("wait for interrupt")?;
    info!("🛑 interrupt received, shutting down");
    Ok(())
}

async fn list_markets() -> Result<()> {
    let client = http_client()?;
    let discovery = GammaDiscovery::new(client);
    let now = Utc::now();

    for timeframe in Timeframe::ALL {
        println!("── {} ──────────────────────────────", timeframe);
        match discovery.nearest(timeframe).await? {
            Some(inst) => {
                println!("  Title:        {}", inst.title);
                println!("  Market ID:    {}", inst.market_id);
                println!("  Condition ID: {}", inst.condition_id);
                println!("  YES token:    {}", inst.yes_token_id);
                println!("  NO token:     {}", inst.no_token_id);
                println!("  Expires:      {} ({}s left)", inst.end_time.to_rfc3339(), inst.seconds_left(now));
            }
            None => println!("  (no open instrument)"),
        }
        println!();
    }
    Ok(())
}
