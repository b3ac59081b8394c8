//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    AmountError, Balance, FixedInitialBalance, InitialBalancePolicy, SeededRandomBalance,
};

/// How new accounts are funded at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialBalanceConfig {
    /// Every account starts with the same balance
    Fixed(Balance),
    /// Seeded uniform draw in `[min, max]`
    Random { min: Balance, max: Balance, seed: u64 },
}

impl InitialBalanceConfig {
    /// Build the policy this configuration describes
    pub fn build(&self) -> Result<Arc<dyn InitialBalancePolicy>, AmountError> {
        Ok(match *self {
            InitialBalanceConfig::Fixed(balance) => Arc::new(FixedInitialBalance::new(balance)),
            InitialBalanceConfig::Random { min, max, seed } => {
                Arc::new(SeededRandomBalance::new(min, max, seed)?)
            }
        })
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory ledger is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Bounded lifetime of every ledger transaction
    pub transaction_timeout: Duration,

    /// Registration funding policy
    pub initial_balance: InitialBalanceConfig,

    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,

    /// Emit JSON log lines instead of text
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(&lookup, "PORT", 8000)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let timeout_ms: u64 = parse_or(&lookup, "TRANSACTION_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("TRANSACTION_TIMEOUT_MS"));
        }

        let initial = parse_balance(&lookup, "INITIAL_BALANCE", 0)?;
        let initial_balance = match lookup("INITIAL_BALANCE_MAX") {
            Some(_) => {
                let max = parse_balance(&lookup, "INITIAL_BALANCE_MAX", 0)?;
                if max < initial {
                    return Err(ConfigError::InvalidValue("INITIAL_BALANCE_MAX"));
                }
                InitialBalanceConfig::Random {
                    min: initial,
                    max,
                    seed: parse_or(&lookup, "INITIAL_BALANCE_SEED", 0)?,
                }
            }
            None => InitialBalanceConfig::Fixed(initial),
        };

        let cors_origin = lookup("CORS_ORIGIN").filter(|origin| !origin.trim().is_empty());

        let log_json = lookup("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            transaction_timeout: Duration::from_millis(timeout_ms),
            initial_balance,
            cors_origin,
            log_json,
        };

        // The in-memory ledger is never acceptable in production.
        if config.is_production() && config.database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn parse_balance<F>(lookup: &F, key: &'static str, default: i64) -> Result<Balance, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    Balance::new(value).map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
