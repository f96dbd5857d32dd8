//! Service: composition root and runtime loop.
//!
//! The Service ties together all components:
//! - Repositories (PostgreSQL or in-memory)
//! - Lookup services behind cache-first resolvers
//! - Quoting aggregate and the batch handler in front of it
//! - API Server (read-only HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Build and initialize components (`ServiceBuilder`)
//! 3. Start API server
//! 4. Main loop (consume batch, handle, produce)
//! 5. Shutdown on SIGINT, bus close or a fatal batch error

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::Registry;
use tokio::net::TcpListener;
use tracing::{error, info};
#[cfg(not(feature = "postgres"))]
use tracing::warn;

use quoting_aggregate::QuotingAggregate;
use quoting_connectors::{
    AccountLookupService, CachedAccountResolver, CachedParticipantResolver,
    HttpAccountLookupClient, HttpParticipantClient, ParticipantService,
    StubAccountLookupService, StubParticipantService,
};
use quoting_store::{BulkQuoteRepository, MemoryStore, QuoteRepository};

use crate::api::{create_router, ApiState};
use crate::config::{Config, Environment};
use crate::error::{DaemonError, DaemonResult};
use crate::handler::BatchHandler;
use crate::message_bus::{MessageConsumer, MessageProducer};
use crate::metrics::BatchMetrics;

// =============================================================================
// Builder
// =============================================================================

/// Explicit dependency wiring. Anything not supplied is derived from config.
pub struct ServiceBuilder {
    config: Config,
    quotes: Option<Arc<dyn QuoteRepository>>,
    bulk_quotes: Option<Arc<dyn BulkQuoteRepository>>,
    participants: Option<Arc<dyn ParticipantService>>,
    accounts: Option<Arc<dyn AccountLookupService>>,
    registry: Option<Registry>,
}

impl ServiceBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            quotes: None,
            bulk_quotes: None,
            participants: None,
            accounts: None,
            registry: None,
        }
    }

    pub fn with_quote_repository(mut self, repo: Arc<dyn QuoteRepository>) -> Self {
        self.quotes = Some(repo);
        self
    }

    pub fn with_bulk_quote_repository(mut self, repo: Arc<dyn BulkQuoteRepository>) -> Self {
        self.bulk_quotes = Some(repo);
        self
    }

    pub fn with_participant_service(mut self, service: Arc<dyn ParticipantService>) -> Self {
        self.participants = Some(service);
        self
    }

    pub fn with_account_lookup_service(mut self, service: Arc<dyn AccountLookupService>) -> Self {
        self.accounts = Some(service);
        self
    }

    /// Register metrics here instead of on a fresh registry
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Wire everything and initialize the repositories.
    pub async fn build(self) -> DaemonResult<Service> {
        let config = self.config;

        let (default_quotes, default_bulk_quotes) = default_repositories(&config);
        let quotes = self.quotes.unwrap_or(default_quotes);
        let bulk_quotes = self.bulk_quotes.unwrap_or(default_bulk_quotes);
        quotes.init().await?;
        bulk_quotes.init().await?;

        let participants = match self.participants {
            Some(service) => service,
            None => participant_service(&config)?,
        };
        let accounts = match self.accounts {
            Some(service) => service,
            None => account_lookup_service(&config)?,
        };

        let aggregate = Arc::new(QuotingAggregate::new(
            config.aggregate.clone(),
            quotes.clone(),
            bulk_quotes.clone(),
            Arc::new(CachedParticipantResolver::new(participants, config.cache_ttl_ms)),
            Arc::new(CachedAccountResolver::new(accounts, config.cache_ttl_ms)),
        ));

        let registry = self.registry.unwrap_or_else(Registry::new);
        let metrics = Arc::new(BatchMetrics::new(&registry)?);
        let handler = BatchHandler::new(aggregate, metrics.clone());

        info!(
            environment = %config.environment,
            pass_through = config.aggregate.pass_through_mode,
            "Service wired"
        );

        Ok(Service { config, handler, metrics, registry, quotes, bulk_quotes })
    }
}

#[cfg(feature = "postgres")]
fn default_repositories(
    config: &Config,
) -> (Arc<dyn QuoteRepository>, Arc<dyn BulkQuoteRepository>) {
    match &config.database_url {
        Some(url) => {
            let store = Arc::new(quoting_store::PgStore::new(url.clone()));
            (store.clone(), store)
        },
        None => memory_repositories(),
    }
}

#[cfg(not(feature = "postgres"))]
fn default_repositories(
    config: &Config,
) -> (Arc<dyn QuoteRepository>, Arc<dyn BulkQuoteRepository>) {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled, using in-memory store");
    }
    memory_repositories()
}

fn memory_repositories() -> (Arc<dyn QuoteRepository>, Arc<dyn BulkQuoteRepository>) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), store)
}

fn participant_service(config: &Config) -> DaemonResult<Arc<dyn ParticipantService>> {
    if config.environment == Environment::Test {
        return Ok(Arc::new(StubParticipantService::new()));
    }
    let url = config
        .services
        .participants_url
        .clone()
        .ok_or_else(|| DaemonError::Config("PARTICIPANTS_SVC_URL is required".into()))?;
    Ok(Arc::new(HttpParticipantClient::new(url, config.services.token.clone())))
}

fn account_lookup_service(config: &Config) -> DaemonResult<Arc<dyn AccountLookupService>> {
    if config.environment == Environment::Test {
        return Ok(Arc::new(StubAccountLookupService::new()));
    }
    let url = config
        .services
        .account_lookup_url
        .clone()
        .ok_or_else(|| DaemonError::Config("ACCOUNT_LOOKUP_SVC_URL is required".into()))?;
    Ok(Arc::new(HttpAccountLookupClient::new(url, config.services.token.clone())))
}

// =============================================================================
// Service
// =============================================================================

/// The quoting service.
pub struct Service {
    config: Config,
    handler: BatchHandler,
    metrics: Arc<BatchMetrics>,
    registry: Registry,
    quotes: Arc<dyn QuoteRepository>,
    bulk_quotes: Arc<dyn BulkQuoteRepository>,
}

impl Service {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }

    /// Registry holding the service metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn handler(&self) -> &BatchHandler {
        &self.handler
    }

    /// Run the service.
    ///
    /// Returns when the consumer is exhausted or SIGINT arrives. A fatal batch
    /// error stops the loop and is returned after shutdown.
    pub async fn run<C, P>(&self, mut consumer: C, producer: P) -> DaemonResult<()>
    where
        C: MessageConsumer,
        P: MessageProducer,
    {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting quoting service"
        );

        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        let result = self.consume(&mut consumer, &producer).await;
        if let Err(e) = &result {
            error!(error = %e, "Stopping after fatal batch error");
        }

        if let Err(e) = self.shutdown().await {
            error!(error = %e, "Shutdown failed");
            // A batch error outranks the shutdown error
            result?;
            return Err(e);
        }
        result
    }

    async fn consume<C, P>(&self, consumer: &mut C, producer: &P) -> DaemonResult<()>
    where
        C: MessageConsumer,
        P: MessageProducer,
    {
        info!("Entering main loop");
        loop {
            tokio::select! {
                batch = consumer.next_batch() => {
                    match batch {
                        Some(batch) => {
                            let outbound = self.handler.handle(batch).await?;
                            producer.send(outbound).await?;
                        }
                        None => {
                            info!("Message bus closed");
                            return Ok(());
                        }
                    }
                }

                // Handle shutdown signals
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    /// Start the API server.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            quotes: self.quotes.clone(),
            bulk_quotes: self.bulk_quotes.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating shutdown");

        self.quotes.destroy().await?;
        self.bulk_quotes.destroy().await?;

        info!(failed_batches = self.metrics.failures_total(), "Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
