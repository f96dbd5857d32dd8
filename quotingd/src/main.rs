//! Quoting service daemon
//!
//! Consumes quoting commands, runs them through the aggregate and publishes
//! the resulting events. Serves a read-only admin API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p quotingd
//!
//! # Test environment (stub lookup services), JSON logs
//! QUOTING_ENV=test QUOTING_LOG_JSON=true QUOTING_API_PORT=8081 cargo run -p quotingd
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTING_ENV`: Environment (test, development, production)
//! - `QUOTING_API_HOST` / `QUOTING_API_PORT`: API bind address (default: 0.0.0.0:8080)
//! - `QUOTING_PASS_THROUGH_MODE`: Skip participant and scheme checks (default: false)
//! - `QUOTING_SUPPORTED_CURRENCIES`: Comma-separated list (default: USD,EUR)
//! - `QUOTING_CACHE_TTL_MS`: Resolver cache TTL (default: 300000)
//! - `QUOTING_BATCH_SIZE` / `QUOTING_BATCH_TIMEOUT_MS`: Batch assembly (default: 50 / 1000)
//! - `QUOTING_MAX_BULK_QUOTES`: Bulk item limit (default: 1000)
//! - `PARTICIPANTS_SVC_URL` / `ACCOUNT_LOOKUP_SVC_URL` / `QUOTING_SVC_TOKEN`: Lookup services
//! - `DATABASE_URL`: PostgreSQL (requires the `postgres` feature)
//! - `QUOTING_LOG_JSON`: Emit JSON logs (default: false)

use quotingd::{Config, InMemoryBus, ServiceBuilder};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Inbound queue depth of the in-process bus
const BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let json_logs = std::env::var("QUOTING_LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("quotingd=info".parse()?));
    if json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Quoting service"
    );

    let (bus, consumer) = InMemoryBus::new(BUS_CAPACITY, config.batch);
    let service = ServiceBuilder::new(config).build().await?;

    // Log everything the service publishes
    let mut outbound = bus.subscribe();
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message {
                Ok(message) => debug!(
                    msg_name = message.msg_name(),
                    msg_key = ?message.msg_key,
                    error = message.is_error(),
                    "Published"
                ),
                Err(lag_msg) => warn!(%lag_msg, "Outbound receiver lagged"),
            }
        }
    });

    service.run(consumer, bus.producer()).await?;

    Ok(())
}
