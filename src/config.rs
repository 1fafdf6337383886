//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::RecorderError;

pub const DEFAULT_ALL_POSITIONS_URL: &str = "https://www3.septa.org/hackathon/TransitViewAll/";
pub const DEFAULT_ROUTE_POSITIONS_URL: &str = "https://www3.septa.org/hackathon/TransitView/";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub poller: PollerConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub all_positions_url: String,
    /// Base URL, the route label is appended as the last path segment
    pub route_positions_url: String,
    /// Per-request timeout
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`
    #[serde(default)]
    pub url: String,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: Duration,
}

/// Values given on the command line, applied on top of files and environment
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_url: Option<String>,
    pub interval_seconds: Option<i64>,
}

impl AppConfig {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let file = match &overrides.config_file {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name("config/default").required(false),
        };

        let config = Config::builder()
            .set_default("feed.all_positions_url", DEFAULT_ALL_POSITIONS_URL)?
            .set_default("feed.route_positions_url", DEFAULT_ROUTE_POSITIONS_URL)?
            .set_default("feed.timeout", 30)?
            .set_default("poller.interval", 60)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("TRANSIT_RECORDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", overrides.database_url.clone())?
            .set_override_option("poller.interval", overrides.interval_seconds)?
            .build()?;

        config.try_deserialize()
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.timeout.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Feed timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.url.trim().is_empty() {
            return Err(RecorderError::ConfigurationError {
                message: "Database URL cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl PollerConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.interval.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Polling interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
