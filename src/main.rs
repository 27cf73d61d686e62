//! price-tracker - Single-product price tracking CLI
//!
//! Uses TLS fingerprint emulation to fetch the product page.

use anyhow::Result;
use clap::{Parser, Subcommand};
use price_tracker::commands::{HistoryCommand, TrackCommand};
use price_tracker::config::{Config, OutputFormat};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "price-tracker",
    version,
    about = "Track a product's price and alert on significant changes",
    long_about = "Extracts price, discount and rating from a product page, records every reading \
                  to MongoDB and/or a CSV log, and alerts when the price moves past a threshold."
)]
struct Cli {
    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "TRACKER_PROXY")]
    proxy: Option<String>,

    /// Delay before each request in milliseconds
    #[arg(long, global = true, env = "TRACKER_DELAY")]
    delay: Option<u64>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a product continuously
    #[command(alias = "t")]
    Track {
        /// Product page URL
        #[arg(env = "TRACKER_URL")]
        url: Option<String>,

        /// Seconds between checks
        #[arg(short, long, env = "TRACKER_INTERVAL")]
        interval: Option<u64>,
    },

    /// Check a product once and print the result
    #[command(alias = "c")]
    Check {
        /// Product page URL
        #[arg(env = "TRACKER_URL")]
        url: Option<String>,
    },

    /// Show recent price history
    #[command(alias = "h")]
    History {
        /// Number of observations to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(delay) = cli.delay {
        config.delay_ms = delay;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }

    match cli.command {
        Commands::Track { url, interval } => {
            if let Some(url) = url {
                config.url = Some(url);
            }
            if let Some(interval) = interval {
                config.interval_secs = interval;
            }

            let url = config.require_url()?.to_string();
            let cmd = TrackCommand::new(config);
            cmd.run(&url).await?;
        }

        Commands::Check { url } => {
            if let Some(url) = url {
                config.url = Some(url);
            }

            let url = config.require_url()?.to_string();
            let cmd = TrackCommand::new(config);
            let output = cmd.execute(&url).await?;
            println!("{}", output);
        }

        Commands::History { limit } => {
            let cmd = HistoryCommand::new(config);
            let output = cmd.execute(limit).await?;
            println!("{}", output);
        }
    }

    Ok(())
}
