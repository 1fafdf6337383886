//! Transit recorder utility

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use transit_recorder::{
    config::{AppConfig, ConfigOverrides},
    errors::RecorderError,
    feed::{FeedClient, PositionFeed},
    poller::Poller,
    store,
};

#[derive(Debug, Parser)]
#[command(version, about = "Record SEPTA TransitView vehicle positions")]
struct Cli {
    /// Configuration file, `config/default.*` is used if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the feed forever and store every snapshot
    Record {
        /// Database URL, `postgres://...` or `sqlite:...`
        #[arg(long)]
        db_url: Option<String>,
        /// Polling interval in seconds
        #[arg(long, allow_negative_numbers = true)]
        interval: Option<i64>,
    },
    /// Print the vehicles currently on one route
    Show { route: String },
}

#[tokio::main]
async fn main() -> Result<(), RecorderError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut overrides = ConfigOverrides {
        config_file: cli.config.clone(),
        ..Default::default()
    };
    if let Command::Record { db_url, interval } = &cli.command {
        overrides.database_url = db_url.clone();
        overrides.interval_seconds = *interval;
    }

    let config = AppConfig::load(&overrides)?;
    let feed = FeedClient::new(&config.feed)?;

    match cli.command {
        Command::Record { .. } => record(config, feed).await,
        Command::Show { route } => show(&feed, &route).await,
    }
}

async fn record(config: AppConfig, feed: FeedClient) -> Result<(), RecorderError> {
    config.database.validate()?;
    config.poller.validate()?;

    // Failing to connect or to create the schema is fatal
    let store = store::connect(&config.database.url).await?;
    store.initialize().await?;

    let poller = Poller::new(Box::new(feed), store, config.poller.interval);

    tokio::select! {
        _ = poller.run() => {}
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    poller.close().await;
    info!("Database connection closed");

    Ok(())
}

async fn show(feed: &FeedClient, route: &str) -> Result<(), RecorderError> {
    let positions = feed.fetch_route_positions(route).await?;
    info!("Route {}: {} vehicles", route, positions.len());

    for position in &positions {
        println!("{}\n", position);
    }

    Ok(())
}
