//! Business error taxonomy.
//!
//! Business errors are values, never panics: the aggregate turns every
//! [`QuotingError`] into an outbound error event.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of business error codes emitted on error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Message shape
    InvalidMessagePayload,
    InvalidMessageType,

    // Participants
    InvalidSourceParticipant,
    InvalidDestinationParticipant,
    SourceParticipantNotFound,
    DestinationParticipantNotFound,
    RequiredSourceParticipantIdMismatch,
    RequiredSourceParticipantNotApproved,
    RequiredSourceParticipantNotActive,
    RequiredDestinationParticipantIdMismatch,
    RequiredDestinationParticipantNotApproved,
    RequiredDestinationParticipantNotActive,

    // Scheme rules
    RuleSchemeViolatedRequest,
    RuleSchemeViolatedResponse,

    // Quotes
    DuplicateQuote,
    QuoteNotFound,
    QuoteExpired,
    UnableToAddQuote,
    UnableToUpdateQuote,
    UnableToGetQuote,
    InvalidQuoteState,

    // Bulk quotes
    DuplicateBulkQuote,
    BulkQuoteNotFound,
    BulkQuoteExpired,
    InvalidBulkQuoteLength,
    UnableToAddBulkQuote,
    UnableToUpdateBulkQuote,
    UnableToGetBulkQuote,
    IndividualQuoteNotFound,

    // Lookups
    PayeeParticipantNotFound,
    UnableToProcessMessage,
}

impl ErrorCode {
    /// Taxonomy name as carried in `errorMsg`
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMessagePayload => "INVALID_MESSAGE_PAYLOAD",
            ErrorCode::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            ErrorCode::InvalidSourceParticipant => "INVALID_SOURCE_PARTICIPANT",
            ErrorCode::InvalidDestinationParticipant => "INVALID_DESTINATION_PARTICIPANT",
            ErrorCode::SourceParticipantNotFound => "SOURCE_PARTICIPANT_NOT_FOUND",
            ErrorCode::DestinationParticipantNotFound => "DESTINATION_PARTICIPANT_NOT_FOUND",
            ErrorCode::RequiredSourceParticipantIdMismatch => {
                "REQUIRED_SOURCE_PARTICIPANT_ID_MISMATCH"
            },
            ErrorCode::RequiredSourceParticipantNotApproved => {
                "REQUIRED_SOURCE_PARTICIPANT_NOT_APPROVED"
            },
            ErrorCode::RequiredSourceParticipantNotActive => "REQUIRED_SOURCE_PARTICIPANT_NOT_ACTIVE",
            ErrorCode::RequiredDestinationParticipantIdMismatch => {
                "REQUIRED_DESTINATION_PARTICIPANT_ID_MISMATCH"
            },
            ErrorCode::RequiredDestinationParticipantNotApproved => {
                "REQUIRED_DESTINATION_PARTICIPANT_NOT_APPROVED"
            },
            ErrorCode::RequiredDestinationParticipantNotActive => {
                "REQUIRED_DESTINATION_PARTICIPANT_NOT_ACTIVE"
            },
            ErrorCode::RuleSchemeViolatedRequest => "RULE_SCHEME_VIOLATED_REQUEST",
            ErrorCode::RuleSchemeViolatedResponse => "RULE_SCHEME_VIOLATED_RESPONSE",
            ErrorCode::DuplicateQuote => "DUPLICATE_QUOTE",
            ErrorCode::QuoteNotFound => "QUOTE_NOT_FOUND",
            ErrorCode::QuoteExpired => "QUOTE_EXPIRED",
            ErrorCode::UnableToAddQuote => "UNABLE_TO_ADD_QUOTE",
            ErrorCode::UnableToUpdateQuote => "UNABLE_TO_UPDATE_QUOTE",
            ErrorCode::UnableToGetQuote => "UNABLE_TO_GET_QUOTE",
            ErrorCode::InvalidQuoteState => "INVALID_QUOTE_STATE",
            ErrorCode::DuplicateBulkQuote => "DUPLICATE_BULK_QUOTE",
            ErrorCode::BulkQuoteNotFound => "BULK_QUOTE_NOT_FOUND",
            ErrorCode::BulkQuoteExpired => "BULK_QUOTE_EXPIRED",
            ErrorCode::InvalidBulkQuoteLength => "INVALID_BULK_QUOTE_LENGTH",
            ErrorCode::UnableToAddBulkQuote => "UNABLE_TO_ADD_BULK_QUOTE",
            ErrorCode::UnableToUpdateBulkQuote => "UNABLE_TO_UPDATE_BULK_QUOTE",
            ErrorCode::UnableToGetBulkQuote => "UNABLE_TO_GET_BULK_QUOTE",
            ErrorCode::IndividualQuoteNotFound => "INDIVIDUAL_QUOTE_NOT_FOUND",
            ErrorCode::PayeeParticipantNotFound => "PAYEE_PARTICIPANT_NOT_FOUND",
            ErrorCode::UnableToProcessMessage => "UNABLE_TO_PROCESS_MESSAGE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A business failure: taxonomy code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct QuotingError {
    pub code: ErrorCode,
    pub message: String,
}

impl QuotingError {
    /// Create a business error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<ErrorCode> for QuotingError {
    fn from(code: ErrorCode) -> Self {
        Self { code, message: code.name().to_string() }
    }
}
