//! # mtlink-runner
//!
//! Main entry point for the terminal bridge.
//!
//! Loads a JSON configuration file, connects the bridge to a running
//! terminal, downloads history for one symbol, opens a live stream, and keeps
//! the table rolling until interrupted.
//!
//! # Usage
//!
//! ```bash
//! mtlink-runner config.json --symbol EURUSD --frame M5 --save-window 0,1
//! ```

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{error, info};

use mtlink_md::tracker::MarketTracker;

/// Terminal Bridge Market Data Runner.
#[derive(Parser)]
#[command(name = "mtlink-runner", about = "Terminal Bridge Market Data Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Symbol to track.
    #[arg(short, long, default_value = "EURUSD")]
    symbol: String,

    /// Timeframe label for history and the live stream.
    #[arg(short, long, default_value = "M5")]
    frame: String,

    /// History rows to request at startup.
    #[arg(short, long, default_value_t = 10_000)]
    rows: u32,

    /// Terminal stream slot for the subscription.
    #[arg(long, default_value_t = 0)]
    slot: u32,

    /// Export this fractional window of the table on exit, e.g. "0,1".
    #[arg(long, value_name = "FROM,TO")]
    save_window: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = mtlink_core::config::load_config(&cli.config)?;

    // 2. Initialize logging (a CLI directory wins over the config file)
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    mtlink_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!(
        "mtlink-runner starting, config={}, log_level={}",
        cli.config.display(),
        cli.log_level,
    );

    // 3. Connect the bridge (handshake included)
    let mut tracker = MarketTracker::connect(&config).await?;

    // 4. Request history and open the live stream
    tracker.download(&cli.symbol, &cli.frame, cli.rows)?;
    tracker.subscribe(&cli.symbol, &cli.frame, cli.slot)?;
    info!(
        "streaming {} at {} in slot {}, press Ctrl+C to stop",
        cli.symbol, cli.frame, cli.slot,
    );

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Report what was collected
    let store = tracker.store();
    if let Ok(store) = store.lock() {
        for symbol in store.tracked_symbols() {
            if let Some(table) = store.table(&symbol) {
                info!("{symbol}: {} rows held", table.len());
            }
        }
    }

    // 7. Optionally export the collected table before teardown
    if let Some(window) = &cli.save_window {
        match parse_window(window).and_then(|(from, to)| Ok(tracker.save(&cli.symbol, from, to)?)) {
            Ok(path) => info!("table saved to {}", path.display()),
            Err(e) => error!("save failed: {e}"),
        }
    }

    // 8. Tear the link down, telling the terminal to close its side
    tracker.unsubscribe(&cli.symbol)?;
    tracker.shutdown(true).await;
    info!("goodbye");
    Ok(())
}

/// Parses a "from,to" fractional window.
fn parse_window(raw: &str) -> Result<(f64, f64)> {
    let (from, to) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("window must look like \"0,1\""))?;
    Ok((from.trim().parse()?, to.trim().parse()?))
}
