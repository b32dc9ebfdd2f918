//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values can come from config files or environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub metering: MeteringConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Metering-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MeteringConfig {
    /// Credits charged for one polish operation
    #[serde(default = "default_operation_cost")]
    pub default_operation_cost: i64,

    /// Default page size for ledger and usage listings
    #[serde(default = "default_list_limit")]
    pub default_list_limit: i64,

    /// Hard ceiling on listing page size
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: i64,
}

fn default_operation_cost() -> i64 {
    1
}

fn default_list_limit() -> i64 {
    50
}

fn default_max_list_limit() -> i64 {
    1000
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("metering.default_operation_cost", 1)?
            .set_default("metering.default_list_limit", 50)?
            .set_default("metering.max_list_limit", 1000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with TALLY_ prefix
            .add_source(
                Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            )
            // Support plain environment variables (DATABASE__URL etc.)
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            default_operation_cost: 1,
            default_list_limit: 50,
            max_list_limit: 1000,
        }
    }
}

impl MeteringConfig {
    /// Clamp a caller-supplied listing limit to the configured bounds
    pub fn clamp_limit(&self, limit: Option<i64>) -> i64 {
        limit
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit)
    }
}
