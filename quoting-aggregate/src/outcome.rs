//! Per-message bookkeeping: what is known about the message so far and how a
//! handler failed.

use quoting_connectors::ResolverError;
use quoting_domain::{
    BulkQuoteId, DomainError, ErrorCode, FspId, InboundMessage, Party, QuoteId, QuotingError,
    QuotingErrorEvent,
};
use quoting_store::StoreError;
use serde::de::DeserializeOwned;

use crate::error::AggregateError;
use crate::rules::ParticipantRole;

/// How a handler failed
#[derive(Debug)]
pub(crate) enum Failure {
    /// Reported to the caller as an error event
    Business(QuotingError),
    /// Aborts the batch
    Fatal(AggregateError),
}

impl Failure {
    pub(crate) fn business(code: ErrorCode, message: impl Into<String>) -> Self {
        Failure::Business(QuotingError::new(code, message))
    }

    pub(crate) fn invalid_state(err: DomainError) -> Self {
        Failure::business(ErrorCode::InvalidQuoteState, err.to_string())
    }

    /// Map an insert failure. Only an unreachable store is fatal.
    pub(crate) fn on_add(err: StoreError, duplicate: ErrorCode, unable: ErrorCode) -> Self {
        match err {
            StoreError::Duplicate { .. } => Failure::business(duplicate, err.to_string()),
            StoreError::Connection(_) => Failure::Fatal(err.into()),
            other => Failure::business(unable, other.to_string()),
        }
    }

    /// Map an update failure. Connection and database errors are fatal.
    pub(crate) fn on_update(err: StoreError, not_found: ErrorCode, unable: ErrorCode) -> Self {
        match err {
            StoreError::NotFound { .. } => Failure::business(not_found, err.to_string()),
            StoreError::InvalidTransition(_) => {
                Failure::business(ErrorCode::InvalidQuoteState, err.to_string())
            },
            StoreError::Duplicate { .. } | StoreError::Serialization(_) => {
                Failure::business(unable, err.to_string())
            },
            StoreError::Database(_) | StoreError::Connection(_) => Failure::Fatal(err.into()),
        }
    }

    /// Map a read failure. Only an undecodable record is a business error.
    pub(crate) fn on_read(err: StoreError, unable: ErrorCode) -> Self {
        match err {
            StoreError::Serialization(_) => Failure::business(unable, err.to_string()),
            other => Failure::Fatal(other.into()),
        }
    }
}

impl From<QuotingError> for Failure {
    fn from(err: QuotingError) -> Self {
        Failure::Business(err)
    }
}

impl From<ResolverError> for Failure {
    fn from(err: ResolverError) -> Self {
        Failure::Fatal(err.into())
    }
}

fn require(fsp_id: &Option<FspId>, role: ParticipantRole, label: &str) -> Result<FspId, Failure> {
    fsp_id.clone().ok_or_else(|| {
        Failure::business(role.missing_code(), format!("{} fsp id is missing", label))
    })
}

/// Everything known about a message at the time it fails
#[derive(Debug, Clone)]
pub(crate) struct MessageContext {
    pub source_event: String,
    pub requester_fsp_id: Option<FspId>,
    pub destination_fsp_id: Option<FspId>,
    pub quote_id: Option<QuoteId>,
    pub bulk_quote_id: Option<BulkQuoteId>,
}

impl MessageContext {
    pub(crate) fn from_message(message: &InboundMessage) -> Self {
        let payload_str = |field: &str| {
            message.payload.get(field).and_then(|v| v.as_str()).map(str::to_string)
        };
        let header = &message.fspiop_opaque_state;

        Self {
            source_event: message.msg_name.clone(),
            requester_fsp_id: header.requester().map(str::to_string),
            destination_fsp_id: header.destination().map(str::to_string),
            quote_id: payload_str("quoteId"),
            bulk_quote_id: payload_str("bulkQuoteId"),
        }
    }

    pub(crate) fn require_requester(&self) -> Result<FspId, Failure> {
        require(&self.requester_fsp_id, ParticipantRole::Source, "requester")
    }

    pub(crate) fn require_destination(&self) -> Result<FspId, Failure> {
        require(&self.destination_fsp_id, ParticipantRole::Destination, "destination")
    }

    pub(crate) fn error_event(&self, error: QuotingError) -> QuotingErrorEvent {
        QuotingErrorEvent::new(
            error,
            self.source_event.clone(),
            self.requester_fsp_id.clone(),
            self.destination_fsp_id.clone(),
        )
        .for_quote(self.quote_id.clone())
        .for_bulk_quote(self.bulk_quote_id.clone())
    }
}

/// Deserialize the message payload into its typed form
pub(crate) fn parse_payload<T: DeserializeOwned>(message: &InboundMessage) -> Result<T, Failure> {
    serde_json::from_value(message.payload.clone()).map_err(|e| {
        Failure::business(
            ErrorCode::InvalidMessagePayload,
            format!("{} payload: {}", message.msg_name, e),
        )
    })
}

pub(crate) fn check_party(party: &Party) -> Result<(), Failure> {
    party
        .party_id_info
        .validate()
        .map_err(|e| Failure::business(ErrorCode::InvalidMessagePayload, e.to_string()))
}
