//! Application configuration loaded from environment variables.
//!
//! Configuration is loaded once at startup and validated before the server starts.
//!
//! ## Variables
//!
//! - `SERVER_HOST` - Bind host (default: `localhost`)
//! - `SERVER_PORT` - Bind port, 1-65535 (default: `8080`)
//! - `LOG_LEVEL` - `debug`, `info`, `warn` or `error` (default: `info`)
//! - `LOG_FORMAT` - `json` or `text` (default: `json`)
//! - `ENVIRONMENT` - `development`, `staging` or `production` (default: `development`)
//! - `SHUTDOWN_TIMEOUT` - Seconds in-flight requests get after a shutdown signal (default: `30`)
//!
//! ```bash
//! export SERVER_PORT=9090
//! export LOG_FORMAT=text
//! ```

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use crate::logging::{Format, Logger};

const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
const VALID_ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
    /// Grace period for in-flight requests once shutdown starts, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            environment: "development".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = env::var("SERVER_HOST").unwrap_or(defaults.host);
        let port = parse_var("SERVER_PORT")?.unwrap_or(defaults.port);
        let log_level = env::var("LOG_LEVEL")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or(defaults.log_level);
        let log_format = env::var("LOG_FORMAT")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or(defaults.log_format);
        let environment = env::var("ENVIRONMENT").unwrap_or(defaults.environment);
        let shutdown_timeout_secs =
            parse_var("SHUTDOWN_TIMEOUT")?.unwrap_or(defaults.shutdown_timeout_secs);

        Ok(Self {
            host,
            port,
            log_level,
            log_format,
            environment,
            shutdown_timeout_secs,
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `port` is 0
    /// - `environment` is not `development`, `staging` or `production`
    /// - `log_level` is not `debug`, `info`, `warn` or `error`
    /// - `log_format` is not `json` or `text`
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("SERVER_PORT must be between 1 and 65535, got 0");
        }

        if !VALID_ENVIRONMENTS.contains(&self.environment.as_str()) {
            anyhow::bail!(
                "ENVIRONMENT must be one of {:?}, got '{}'",
                VALID_ENVIRONMENTS,
                self.environment
            );
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "LOG_LEVEL must be one of {:?}, got '{}'",
                VALID_LOG_LEVELS,
                self.log_level
            );
        }

        self.format()?;

        Ok(())
    }

    /// `host:port` to bind to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Minimum log level as a filter.
    ///
    /// # Errors
    ///
    /// Returns an error for levels outside `debug`, `info`, `warn`, `error`.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!("invalid log level: {}", self.log_level);
        }
        self.log_level
            .parse()
            .with_context(|| format!("invalid log level: {}", self.log_level))
    }

    /// # Errors
    ///
    /// Returns an error if `log_format` is not `json` or `text`.
    pub fn format(&self) -> Result<Format> {
        self.log_format
            .parse()
            .context("LOG_FORMAT must be 'json' or 'text'")
    }

    /// Builds a stdout [`Logger`] from the logging settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the level or format is invalid.
    pub fn logger(&self) -> Result<Logger> {
        Ok(Logger::builder()
            .level(self.level_filter()?)
            .format(self.format()?)
            .build())
    }

    /// Prints configuration summary.
    pub fn print_summary(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Listen address: {}", self.listen_addr());
        tracing::info!("  Environment: {}", self.environment);
        tracing::info!("  Log level: {}", self.log_level);
        tracing::info!("  Log format: {}", self.log_format);
        tracing::info!("  Shutdown timeout: {}s", self.shutdown_timeout_secs);
    }
}

/// Parses `name` when it is set.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .ok()
        .map(|v| v.parse::<T>())
        .transpose()
        .with_context(|| format!("{name} must be a number"))
}

/// Loads and validates configuration from environment variables.
///
/// # Errors
///
/// Returns an error if a variable cannot be parsed or validation fails.
///
/// # Note
///
/// This function expects environment variables to be already loaded
/// (e.g., via `dotenvy::dotenv()` in `main.rs`).
pub fn load_from_env() -> Result<Config> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}
