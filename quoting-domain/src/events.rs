//! Inbound payloads and outbound events of the quoting service.

use crate::entities::{BulkQuote, BulkQuoteId, FspId, Quote, QuoteId};
use crate::errors::{ErrorCode, QuotingError};
use crate::messages::names;
use crate::value_objects::{
    AmountType, ErrorInformation, Extension, GeoCode, Money, Party, TransactionType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound payloads
// =============================================================================

/// Payload of `QuoteRequestReceivedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequestReceived {
    pub quote_id: QuoteId,
    pub transaction_id: String,
    #[serde(default)]
    pub transaction_request_id: Option<String>,
    pub payee: Party,
    pub payer: Party,
    pub amount_type: AmountType,
    pub amount: Money,
    #[serde(default)]
    pub fees: Option<Money>,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub geo_code: Option<GeoCode>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

impl QuoteRequestReceived {
    /// Currencies appearing anywhere in the request
    pub fn money_fields(&self) -> Vec<&Money> {
        std::iter::once(&self.amount).chain(self.fees.as_ref()).collect()
    }
}

/// Payload of `QuoteResponseReceivedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponseReceived {
    pub quote_id: QuoteId,
    pub transfer_amount: Money,
    pub expiration: DateTime<Utc>,
    pub ilp_packet: String,
    pub condition: String,
    #[serde(default)]
    pub payee_receive_amount: Option<Money>,
    #[serde(default)]
    pub payee_fsp_fee: Option<Money>,
    #[serde(default)]
    pub payee_fsp_commission: Option<Money>,
    #[serde(default)]
    pub geo_code: Option<GeoCode>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

impl QuoteResponseReceived {
    /// Currencies appearing anywhere in the response
    pub fn money_fields(&self) -> Vec<&Money> {
        std::iter::once(&self.transfer_amount)
            .chain(self.payee_receive_amount.as_ref())
            .chain(self.payee_fsp_fee.as_ref())
            .chain(self.payee_fsp_commission.as_ref())
            .collect()
    }
}

/// Payload of `QuoteQueryReceivedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQueryReceived {
    pub quote_id: QuoteId,
}

/// Payload of `QuoteRejectedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRejected {
    pub quote_id: QuoteId,
    pub error_information: ErrorInformation,
}

/// One item of a bulk quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualQuoteRequest {
    pub quote_id: QuoteId,
    pub transaction_id: String,
    pub payee: Party,
    pub amount_type: AmountType,
    pub amount: Money,
    #[serde(default)]
    pub fees: Option<Money>,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

impl IndividualQuoteRequest {
    /// Currencies appearing anywhere in the item
    pub fn money_fields(&self) -> Vec<&Money> {
        std::iter::once(&self.amount).chain(self.fees.as_ref()).collect()
    }
}

/// Payload of `BulkQuoteRequestedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuoteRequested {
    pub bulk_quote_id: BulkQuoteId,
    pub payer: Party,
    #[serde(default)]
    pub geo_code: Option<GeoCode>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    pub individual_quotes: Vec<IndividualQuoteRequest>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

/// Outcome of one item reported by the payee FSP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualQuoteResult {
    pub quote_id: QuoteId,
    #[serde(default)]
    pub payee: Option<Party>,
    #[serde(default)]
    pub transfer_amount: Option<Money>,
    #[serde(default)]
    pub payee_receive_amount: Option<Money>,
    #[serde(default)]
    pub payee_fsp_fee: Option<Money>,
    #[serde(default)]
    pub payee_fsp_commission: Option<Money>,
    #[serde(default)]
    pub ilp_packet: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub error_information: Option<ErrorInformation>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

impl IndividualQuoteResult {
    /// Currencies appearing anywhere in the result
    pub fn money_fields(&self) -> Vec<&Money> {
        self.transfer_amount
            .iter()
            .chain(self.payee_receive_amount.iter())
            .chain(self.payee_fsp_fee.iter())
            .chain(self.payee_fsp_commission.iter())
            .collect()
    }
}

/// Payload of `BulkQuotePendingReceivedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuotePendingReceived {
    pub bulk_quote_id: BulkQuoteId,
    pub individual_quote_results: Vec<IndividualQuoteResult>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extension_list: Option<Vec<Extension>>,
}

/// Payload of `BulkQuoteQueryReceivedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuoteQueryReceived {
    pub bulk_quote_id: BulkQuoteId,
}

/// Payload of `BulkQuoteRejectedEvt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuoteRejected {
    pub bulk_quote_id: BulkQuoteId,
    pub error_information: ErrorInformation,
}

// =============================================================================
// Outbound events
// =============================================================================

/// Error event emitted in place of the success event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotingErrorEvent {
    pub error_msg: ErrorCode,
    #[serde(default)]
    pub error_description: String,
    pub requester_fsp_id: Option<FspId>,
    pub destination_fsp_id: Option<FspId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<QuoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_quote_id: Option<BulkQuoteId>,
    pub source_event: String,
}

impl QuotingErrorEvent {
    /// Build an error event from a business error and what was known at failure time
    pub fn new(
        error: QuotingError,
        source_event: impl Into<String>,
        requester_fsp_id: Option<FspId>,
        destination_fsp_id: Option<FspId>,
    ) -> Self {
        Self {
            error_msg: error.code,
            error_description: error.message,
            requester_fsp_id,
            destination_fsp_id,
            quote_id: None,
            bulk_quote_id: None,
            source_event: source_event.into(),
        }
    }

    /// Attach the quote id
    pub fn for_quote(mut self, quote_id: Option<QuoteId>) -> Self {
        self.quote_id = quote_id;
        self
    }

    /// Attach the bulk quote id
    pub fn for_bulk_quote(mut self, bulk_quote_id: Option<BulkQuoteId>) -> Self {
        self.bulk_quote_id = bulk_quote_id;
        self
    }
}

/// Rejection acknowledgement for a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRejectedResponse {
    pub quote_id: QuoteId,
    pub error_information: ErrorInformation,
}

/// Rejection acknowledgement for a bulk quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuoteRejectedResponse {
    pub bulk_quote_id: BulkQuoteId,
    pub error_information: ErrorInformation,
}

/// Events produced by the aggregate.
///
/// Serialized adjacently tagged so the envelope carries `msgName` next to `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msgName", content = "payload")]
pub enum QuotingEvent {
    #[serde(rename = "QuoteRequestAcceptedEvt")]
    QuoteRequestAccepted(Quote),
    #[serde(rename = "QuoteResponseAcceptedEvt")]
    QuoteResponseAccepted(Quote),
    #[serde(rename = "QuoteQueryResponseEvt")]
    QuoteQueryResponse(Quote),
    #[serde(rename = "QuoteRejectedResponseEvt")]
    QuoteRejectedResponse(QuoteRejectedResponse),
    #[serde(rename = "BulkQuoteReceivedEvt")]
    BulkQuoteReceived(BulkQuote),
    #[serde(rename = "BulkQuoteAcceptedEvt")]
    BulkQuoteAccepted(BulkQuote),
    #[serde(rename = "BulkQuoteQueryResponseEvt")]
    BulkQuoteQueryResponse(BulkQuote),
    #[serde(rename = "BulkQuoteRejectedResponseEvt")]
    BulkQuoteRejectedResponse(BulkQuoteRejectedResponse),
    #[serde(rename = "QuotingErrorEvt")]
    Error(QuotingErrorEvent),
}

impl QuotingEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            QuotingEvent::QuoteRequestAccepted(_) => names::QUOTE_REQUEST_ACCEPTED,
            QuotingEvent::QuoteResponseAccepted(_) => names::QUOTE_RESPONSE_ACCEPTED,
            QuotingEvent::QuoteQueryResponse(_) => names::QUOTE_QUERY_RESPONSE,
            QuotingEvent::QuoteRejectedResponse(_) => names::QUOTE_REJECTED_RESPONSE,
            QuotingEvent::BulkQuoteReceived(_) => names::BULK_QUOTE_RECEIVED,
            QuotingEvent::BulkQuoteAccepted(_) => names::BULK_QUOTE_ACCEPTED,
            QuotingEvent::BulkQuoteQueryResponse(_) => names::BULK_QUOTE_QUERY_RESPONSE,
            QuotingEvent::BulkQuoteRejectedResponse(_) => names::BULK_QUOTE_REJECTED_RESPONSE,
            QuotingEvent::Error(_) => names::QUOTING_ERROR,
        }
    }

    /// Id of the quote or bulk quote the event is about
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            QuotingEvent::QuoteRequestAccepted(q)
            | QuotingEvent::QuoteResponseAccepted(q)
            | QuotingEvent::QuoteQueryResponse(q) => Some(&q.quote_id),
            QuotingEvent::QuoteRejectedResponse(r) => Some(&r.quote_id),
            QuotingEvent::BulkQuoteReceived(b)
            | QuotingEvent::BulkQuoteAccepted(b)
            | QuotingEvent::BulkQuoteQueryResponse(b) => Some(&b.bulk_quote_id),
            QuotingEvent::BulkQuoteRejectedResponse(r) => Some(&r.bulk_quote_id),
            QuotingEvent::Error(e) => e.bulk_quote_id.as_deref().or(e.quote_id.as_deref()),
        }
    }

    /// Error code, when this is an error event
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            QuotingEvent::Error(e) => Some(e.error_msg),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
