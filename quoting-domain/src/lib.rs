//! Quoting Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains quote entities, value objects, the business error taxonomy,
//! message envelopes and the field-level merge rule used by repositories.

#![warn(clippy::all)]

pub mod entities;
pub mod errors;
pub mod events;
pub mod merge;
pub mod messages;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{BulkQuote, BulkQuoteId, FspId, Participant, Quote, QuoteId, QuoteStatus};
pub use errors::{ErrorCode, QuotingError};
pub use events::{
    BulkQuotePendingReceived, BulkQuoteQueryReceived, BulkQuoteRejected,
    BulkQuoteRejectedResponse, BulkQuoteRequested, IndividualQuoteRequest,
    IndividualQuoteResult, QuoteQueryReceived, QuoteRejected, QuoteRejectedResponse,
    QuoteRequestReceived, QuoteResponseReceived, QuotingErrorEvent, QuotingEvent,
};
pub use merge::Merge;
pub use messages::{
    names, FspiopOpaqueState, InboundMessage, MessageType, OpaqueState, OutboundMessage,
};
pub use value_objects::{
    AmountType, Currency, DomainError, ErrorInformation, Extension, GeoCode, Money, Party,
    PartyIdInfo, TransactionType,
};
