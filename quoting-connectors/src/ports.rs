//! Port definitions for the external lookup services.
//!
//! Ports define the interfaces for participant and account lookups.
//! Adapters implement these ports (HTTP clients, stubs).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use quoting_domain::{FspId, Participant};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by lookup service adapters.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Service answered with a non-success status
    #[error("Service error: {status} - {msg}")]
    ApiError { status: u16, msg: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

// =============================================================================
// Participant Service Port
// =============================================================================

/// Port for the participant registry.
///
/// Implementations:
/// - `HttpParticipantClient` - Central ledger participants API
/// - `StubParticipantService` - For testing
#[async_trait]
pub trait ParticipantService: Send + Sync {
    /// Fetch one participant. `Ok(None)` when the registry does not know it.
    async fn get_participant(&self, fsp_id: &str) -> Result<Option<Participant>, ConnectorError>;

    /// Fetch several participants in one call. Unknown ids are omitted.
    async fn get_participants(&self, fsp_ids: &[String])
        -> Result<Vec<Participant>, ConnectorError>;
}

// =============================================================================
// Account Lookup Port
// =============================================================================

/// Party identity to resolve to its owning FSP
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLookupRequest {
    pub party_id: String,
    pub party_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl AccountLookupRequest {
    /// Create a lookup request
    pub fn new(
        party_id: impl Into<String>,
        party_type: impl Into<String>,
        currency: Option<String>,
    ) -> Self {
        Self { party_id: party_id.into(), party_type: party_type.into(), currency }
    }
}

/// Port for the account lookup service (party → FSP).
///
/// Implementations:
/// - `HttpAccountLookupClient` - Account lookup REST API
/// - `StubAccountLookupService` - For testing
#[async_trait]
pub trait AccountLookupService: Send + Sync {
    /// Resolve one party. `Ok(None)` when no FSP owns it.
    async fn lookup(&self, request: &AccountLookupRequest)
        -> Result<Option<FspId>, ConnectorError>;

    /// Resolve many parties in one call, keyed by caller-chosen keys
    async fn bulk_lookup(
        &self,
        requests: &HashMap<String, AccountLookupRequest>,
    ) -> Result<HashMap<String, Option<FspId>>, ConnectorError>;
}
