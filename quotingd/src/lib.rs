//! Quoting Service Daemon Library
//!
//! Hosts the quoting aggregate behind a message bus.
//!
//! # Architecture
//!
//! ```text
//! Message Bus → Batch Handler → Quoting Aggregate → Resolvers (cache-first)
//!      ↑                               ↓
//!      └──────── outbound events ← Repositories ← Admin API (read-only)
//! ```
//!
//! # Components
//!
//! - **Service**: Composition root (`ServiceBuilder`) and runtime loop
//! - **Batch Handler**: Filters commands, times batches, fails fast
//! - **Message Bus**: In-process batching consumer and broadcast producer
//! - **Metrics**: Prometheus batch metrics
//! - **API**: Read-only HTTP endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use quotingd::{Config, InMemoryBus, ServiceBuilder};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let (bus, consumer) = InMemoryBus::new(1024, config.batch);
//!     let service = ServiceBuilder::new(config).build().await.expect("Wiring failed");
//!     service.run(consumer, bus.producer()).await.expect("Service error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod handler;
pub mod message_bus;
pub mod metrics;

// Re-exports for convenience
pub use api::{create_router, ApiState};
pub use config::{ApiConfig, BatchConfig, Config, Environment, ServicesConfig};
pub use daemon::{Service, ServiceBuilder};
pub use error::{DaemonError, DaemonResult};
pub use handler::BatchHandler;
pub use message_bus::{
    BatchConsumer, BroadcastProducer, InMemoryBus, MessageConsumer, MessageProducer,
    OutboundReceiver,
};
pub use metrics::BatchMetrics;
