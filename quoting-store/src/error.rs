//! Storage layer errors

use quoting_domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (quote, bulk_quote)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Duplicate entity (idempotency violation)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Update would move a status backward or out of a terminal state
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Whether the backing store is unreachable rather than refusing a write
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidStateTransition(detail) => StoreError::InvalidTransition(detail),
            other => StoreError::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity_type: "unknown".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                // Check for unique constraint violation
                if db_err.code().map(|c| c == "23505").unwrap_or(false) {
                    StoreError::Duplicate {
                        entity_type: "unknown".to_string(),
                        id: "unknown".to_string(),
                    }
                } else {
                    StoreError::Database(db_err.to_string())
                }
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Connection(err.to_string()),
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
                StoreError::Serialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
