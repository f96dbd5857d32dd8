//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Resolved once at startup; nothing re-reads the environment afterwards.

use crate::error::{DaemonError, DaemonResult};
use quoting_aggregate::{AggregateConfig, DEFAULT_MAX_BULK_QUOTES};
use quoting_domain::Currency;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default TTL of resolver cache entries
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Business rules handed to the aggregate
    pub aggregate: AggregateConfig,

    /// Batch assembly on the inbound bus
    pub batch: BatchConfig,

    /// External lookup services
    pub services: ServicesConfig,

    /// Resolver cache TTL in milliseconds
    pub cache_ttl_ms: u64,

    /// PostgreSQL URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Batch assembly settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum messages per batch
    pub size: usize,
    /// How long to wait for a batch to fill after its first message
    pub timeout: Duration,
}

/// External service endpoints.
#[derive(Debug, Clone, Default)]
pub struct ServicesConfig {
    pub participants_url: Option<String>,
    pub account_lookup_url: Option<String>,
    /// Bearer token sent to both services
    pub token: Option<String>,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stub lookup services)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let aggregate = Self::load_aggregate_config()?;
        let batch = BatchConfig {
            size: load_parsed("QUOTING_BATCH_SIZE", 50)?,
            timeout: Duration::from_millis(load_parsed("QUOTING_BATCH_TIMEOUT_MS", 1000)?),
        };
        if batch.size == 0 {
            return Err(DaemonError::Config("QUOTING_BATCH_SIZE must be positive".into()));
        }

        let services = ServicesConfig {
            participants_url: load_optional("PARTICIPANTS_SVC_URL"),
            account_lookup_url: load_optional("ACCOUNT_LOOKUP_SVC_URL"),
            token: load_optional("QUOTING_SVC_TOKEN"),
        };

        Ok(Self {
            api,
            aggregate,
            batch,
            services,
            cache_ttl_ms: load_parsed("QUOTING_CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS)?,
            database_url: load_optional("DATABASE_URL"),
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            aggregate: AggregateConfig::default(),
            batch: BatchConfig { size: 10, timeout: Duration::from_millis(50) },
            services: ServicesConfig::default(),
            cache_ttl_ms: 1_000,
            database_url: None,
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("QUOTING_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid QUOTING_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("QUOTING_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = load_parsed("QUOTING_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_aggregate_config() -> DaemonResult<AggregateConfig> {
        let pass_through_mode = match env::var("QUOTING_PASS_THROUGH_MODE") {
            Ok(val) => parse_bool("QUOTING_PASS_THROUGH_MODE", &val)?,
            Err(_) => false,
        };
        let supported_currencies = match env::var("QUOTING_SUPPORTED_CURRENCIES") {
            Ok(val) => parse_currencies(&val)?,
            Err(_) => AggregateConfig::default().supported_currencies,
        };
        let max_bulk_quotes = load_parsed("QUOTING_MAX_BULK_QUOTES", DEFAULT_MAX_BULK_QUOTES)?;

        Ok(AggregateConfig { pass_through_mode, supported_currencies, max_bulk_quotes })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            aggregate: AggregateConfig::default(),
            batch: BatchConfig { size: 50, timeout: Duration::from_millis(1000) },
            services: ServicesConfig::default(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            database_url: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn load_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load_parsed<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_bool(key: &str, value: &str) -> DaemonResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(DaemonError::Config(format!("Invalid {} value: {}", key, other))),
    }
}

/// Parse a comma-separated currency list, e.g. `USD, EUR`
pub(crate) fn parse_currencies(value: &str) -> DaemonResult<Vec<Currency>> {
    let currencies = value
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            Currency::new(code).map_err(|e| {
                DaemonError::Config(format!("Invalid QUOTING_SUPPORTED_CURRENCIES: {}", e))
            })
        })
        .collect::<DaemonResult<Vec<_>>>()?;

    if currencies.is_empty() {
        return Err(DaemonError::Config("QUOTING_SUPPORTED_CURRENCIES is empty".into()));
    }
    Ok(currencies)
}

// =============================================================================
// Tests
// =============================================================================
