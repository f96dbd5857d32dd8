//! Aggregate error types.
//!
//! Only infrastructure failures surface as [`AggregateError`]; business
//! failures become error events and never leave the aggregate as errors.

use thiserror::Error;

/// Errors that abort a batch.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Store error that cannot be expressed as a business outcome
    #[error("Store error: {0}")]
    Store(#[from] quoting_store::StoreError),

    /// Lookup service unavailable
    #[error("Resolver error: {0}")]
    Resolver(#[from] quoting_connectors::ResolverError),
}

/// Result type for aggregate operations.
pub type AggregateResult<T> = Result<T, AggregateError>;
