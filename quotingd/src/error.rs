//! Daemon error types.

use quoting_aggregate::AggregateError;
use quoting_connectors::ConnectorError;
use quoting_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Aggregate aborted a batch
    #[error("Aggregate error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Lookup service error
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Metric registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Message bus error
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
