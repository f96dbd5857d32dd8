//! Message bus envelopes.
//!
//! Inbound messages carry a raw JSON payload: the aggregate owns payload
//! validation so that a malformed payload becomes an error event rather than
//! a consumer failure.

use crate::events::QuotingEvent;
use serde::{Deserialize, Serialize};

/// Message names consumed and produced by the quoting service
pub mod names {
    pub const QUOTE_REQUEST_RECEIVED: &str = "QuoteRequestReceivedEvt";
    pub const QUOTE_RESPONSE_RECEIVED: &str = "QuoteResponseReceivedEvt";
    pub const QUOTE_QUERY_RECEIVED: &str = "QuoteQueryReceivedEvt";
    pub const QUOTE_REJECTED: &str = "QuoteRejectedEvt";
    pub const BULK_QUOTE_REQUESTED: &str = "BulkQuoteRequestedEvt";
    pub const BULK_QUOTE_PENDING_RECEIVED: &str = "BulkQuotePendingReceivedEvt";
    pub const BULK_QUOTE_QUERY_RECEIVED: &str = "BulkQuoteQueryReceivedEvt";
    pub const BULK_QUOTE_REJECTED: &str = "BulkQuoteRejectedEvt";

    pub const QUOTE_REQUEST_ACCEPTED: &str = "QuoteRequestAcceptedEvt";
    pub const QUOTE_RESPONSE_ACCEPTED: &str = "QuoteResponseAcceptedEvt";
    pub const QUOTE_QUERY_RESPONSE: &str = "QuoteQueryResponseEvt";
    pub const QUOTE_REJECTED_RESPONSE: &str = "QuoteRejectedResponseEvt";
    pub const BULK_QUOTE_RECEIVED: &str = "BulkQuoteReceivedEvt";
    pub const BULK_QUOTE_ACCEPTED: &str = "BulkQuoteAcceptedEvt";
    pub const BULK_QUOTE_QUERY_RESPONSE: &str = "BulkQuoteQueryResponseEvt";
    pub const BULK_QUOTE_REJECTED_RESPONSE: &str = "BulkQuoteRejectedResponseEvt";
    pub const QUOTING_ERROR: &str = "QuotingErrorEvt";
}

/// Kind of message on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Command,
    DomainEvent,
}

/// Caller-owned protocol state. Never interpreted, only stored and echoed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueState(pub serde_json::Map<String, serde_json::Value>);

impl OpaqueState {
    /// Whether the blob has no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Routing header attached to every FSPIOP-originated message.
///
/// Only the requester and destination ids are read; every other key is kept
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FspiopOpaqueState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_fsp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_fsp_id: Option<String>,
    #[serde(flatten)]
    pub extra: OpaqueState,
}

impl FspiopOpaqueState {
    /// Header with both participant ids set
    pub fn new(requester_fsp_id: impl Into<String>, destination_fsp_id: impl Into<String>) -> Self {
        Self {
            requester_fsp_id: Some(requester_fsp_id.into()),
            destination_fsp_id: Some(destination_fsp_id.into()),
            extra: OpaqueState::default(),
        }
    }

    /// Requester id, treating blank strings as absent
    pub fn requester(&self) -> Option<&str> {
        self.requester_fsp_id.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Destination id, treating blank strings as absent
    pub fn destination(&self) -> Option<&str> {
        self.destination_fsp_id.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Message consumed from the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub msg_type: MessageType,
    pub msg_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_key: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub fspiop_opaque_state: FspiopOpaqueState,
}

impl InboundMessage {
    /// Build a COMMAND message
    pub fn command(
        msg_name: impl Into<String>,
        payload: serde_json::Value,
        fspiop_opaque_state: FspiopOpaqueState,
    ) -> Self {
        Self {
            msg_type: MessageType::Command,
            msg_name: msg_name.into(),
            msg_key: None,
            payload,
            fspiop_opaque_state,
        }
    }

    /// Build a DOMAIN_EVENT message
    pub fn domain_event(msg_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            msg_type: MessageType::DomainEvent,
            msg_name: msg_name.into(),
            msg_key: None,
            payload,
            fspiop_opaque_state: FspiopOpaqueState::default(),
        }
    }

    /// Id of the entity this message mutates: bulk quote id, else quote id,
    /// else the bus key. Messages sharing a key must be applied in order.
    pub fn entity_key(&self) -> Option<String> {
        ["bulkQuoteId", "quoteId"]
            .iter()
            .find_map(|field| self.payload.get(*field).and_then(|v| v.as_str()))
            .map(str::to_string)
            .or_else(|| self.msg_key.clone())
    }
}

/// Message produced onto the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_key: Option<String>,
    #[serde(default)]
    pub fspiop_opaque_state: FspiopOpaqueState,
    #[serde(flatten)]
    pub event: QuotingEvent,
}

impl OutboundMessage {
    /// Wrap an event, echoing the inbound routing header
    pub fn new(event: QuotingEvent, fspiop_opaque_state: FspiopOpaqueState) -> Self {
        Self {
            msg_type: MessageType::DomainEvent,
            msg_key: event.entity_id().map(str::to_string),
            fspiop_opaque_state,
            event,
        }
    }

    /// Name of the wrapped event
    pub fn msg_name(&self) -> &'static str {
        self.event.name()
    }

    /// Whether this message reports a business error
    pub fn is_error(&self) -> bool {
        matches!(self.event, QuotingEvent::Error(_))
    }
}
