//! Domain Entities for the Quoting Domain
//!
//! Quotes and bulk quotes have identity and a forward-only status lifecycle:
//!
//! ```text
//! none → RECEIVED → PENDING → { ACCEPTED | REJECTED | EXPIRED }
//! ```

use crate::messages::OpaqueState;
use crate::value_objects::{
    AmountType, DomainError, ErrorInformation, Extension, GeoCode, Money, Party, TransactionType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a Quote
pub type QuoteId = String;

/// Unique identifier for a Bulk Quote
pub type BulkQuoteId = String;

/// Identifier of a financial service provider (participant)
pub type FspId = String;

// =============================================================================
// Quote Status
// =============================================================================

/// Lifecycle status shared by quotes and bulk quotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    /// Request accepted by the quoting service
    Received,
    /// Waiting on outstanding responses (bulk only in practice)
    Pending,
    /// Payee answered with terms
    Accepted,
    /// Payer or payee rejected
    Rejected,
    /// Expiration passed before a response arrived
    Expired,
}

impl QuoteStatus {
    fn rank(&self) -> u8 {
        match self {
            QuoteStatus::Received => 1,
            QuoteStatus::Pending => 2,
            QuoteStatus::Accepted | QuoteStatus::Rejected | QuoteStatus::Expired => 3,
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Whether moving to `next` keeps the lifecycle moving forward.
    ///
    /// PENDING → PENDING is allowed so a bulk can absorb several partial responses.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Whether a record stored in this status may be overwritten with `next`.
    /// Rewriting the same status is allowed.
    pub fn accepts_update(&self, next: QuoteStatus) -> bool {
        *self == next || self.can_transition_to(next)
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Received => "RECEIVED",
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Accepted => "ACCEPTED",
            QuoteStatus::Rejected => "REJECTED",
            QuoteStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn transition(
    current: &mut Option<QuoteStatus>,
    next: QuoteStatus,
    id: &str,
) -> Result<(), DomainError> {
    match current {
        Some(status) if !status.can_transition_to(next) => {
            Err(DomainError::InvalidStateTransition(format!("{}: {} → {}", id, status, next)))
        },
        _ => {
            *current = Some(next);
            Ok(())
        },
    }
}

// =============================================================================
// Quote
// =============================================================================

/// A priced instance of a single proposed transfer between a payer and payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub quote_id: QuoteId,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_request_id: Option<String>,
    /// Parent bulk quote, when this quote was fanned out from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_quote_id: Option<BulkQuoteId>,

    pub requester_fsp_id: FspId,
    pub destination_fsp_id: FspId,

    pub payer: Party,
    pub payee: Party,
    pub amount_type: AmountType,
    pub amount: Money,
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_code: Option<GeoCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_list: Option<Vec<Extension>>,

    // Response terms (filled in by the payee FSP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_receive_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_fsp_fee: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_fsp_commission: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ilp_packet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default)]
    pub status: Option<QuoteStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_information: Option<ErrorInformation>,

    /// Protocol state owned by the caller; stored and returned unchanged
    #[serde(default)]
    pub protocol_state: OpaqueState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// Create a quote with no status and no response terms
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        quote_id: impl Into<QuoteId>,
        transaction_id: impl Into<String>,
        requester_fsp_id: impl Into<FspId>,
        destination_fsp_id: impl Into<FspId>,
        payer: Party,
        payee: Party,
        amount_type: AmountType,
        amount: Money,
        transaction_type: TransactionType,
    ) -> Self {
        let now = Utc::now();
        Self {
            quote_id: quote_id.into(),
            transaction_id: transaction_id.into(),
            transaction_request_id: None,
            bulk_quote_id: None,
            requester_fsp_id: requester_fsp_id.into(),
            destination_fsp_id: destination_fsp_id.into(),
            payer,
            payee,
            amount_type,
            amount,
            transaction_type,
            fees: None,
            note: None,
            geo_code: None,
            expiration: None,
            extension_list: None,
            transfer_amount: None,
            payee_receive_amount: None,
            payee_fsp_fee: None,
            payee_fsp_commission: None,
            ilp_packet: None,
            condition: None,
            status: None,
            error_information: None,
            protocol_state: OpaqueState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the quote has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// Whether the quote expired before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Move to `next`, rejecting backward transitions
    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        transition(&mut self.status, next, &self.quote_id)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// Bulk Quote
// =============================================================================

/// A batch of quotes submitted and tracked together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuote {
    pub bulk_quote_id: BulkQuoteId,
    pub payer: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_code: Option<GeoCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub individual_quotes: Vec<Quote>,
    /// Items excluded during validation. Exclusion is permanent.
    #[serde(default)]
    pub quotes_not_processed_ids: Vec<QuoteId>,
    #[serde(default)]
    pub status: Option<QuoteStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_information: Option<ErrorInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_list: Option<Vec<Extension>>,
    #[serde(default)]
    pub protocol_state: OpaqueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkQuote {
    /// Create an empty bulk quote for a payer
    pub fn new(bulk_quote_id: impl Into<BulkQuoteId>, payer: Party) -> Self {
        let now = Utc::now();
        Self {
            bulk_quote_id: bulk_quote_id.into(),
            payer,
            geo_code: None,
            expiration: None,
            individual_quotes: Vec::new(),
            quotes_not_processed_ids: Vec::new(),
            status: None,
            error_information: None,
            extension_list: None,
            protocol_state: OpaqueState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the bulk quote has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// Move to `next`, rejecting backward transitions
    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        transition(&mut self.status, next, &self.bulk_quote_id)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True once every processed individual quote is terminal
    pub fn all_individual_quotes_terminal(&self) -> bool {
        self.individual_quotes.iter().all(Quote::is_terminal)
    }

    /// Status implied by the individual quotes: ACCEPTED when all are terminal,
    /// PENDING otherwise.
    pub fn settled_status(&self) -> QuoteStatus {
        if self.all_individual_quotes_terminal() {
            QuoteStatus::Accepted
        } else {
            QuoteStatus::Pending
        }
    }

    /// Check that excluded ids never appear among the processed quotes.
    pub fn check_exclusions(&self) -> Result<(), DomainError> {
        for id in &self.quotes_not_processed_ids {
            if self.individual_quotes.iter().any(|q| &q.quote_id == id) {
                return Err(DomainError::InvalidStateTransition(format!(
                    "quote {} is both processed and excluded in bulk {}",
                    id, self.bulk_quote_id
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Participant
// =============================================================================

/// External participant record, fetched and cached but never owned here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: FspId,
    #[serde(rename = "type")]
    pub participant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
    pub is_active: bool,
    #[serde(default = "approved_by_default")]
    pub approved: bool,
}

fn approved_by_default() -> bool {
    true
}

impl Participant {
    /// An active, approved DFSP
    pub fn active(id: impl Into<FspId>) -> Self {
        Self {
            id: id.into(),
            participant_type: "DFSP".to_string(),
            sub_id: None,
            is_active: true,
            approved: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Currency;
    use rust_decimal_macros::dec;

    fn test_quote(id: &str) -> Quote {
        Quote::new(
            id,
            "tx-1",
            "payerfsp",
            "payeefsp",
            Party::new("MSISDN", "111"),
            Party::new("MSISDN", "222"),
            AmountType::Send,
            Money::new(Currency::new("USD").unwrap(), dec!(10)),
            TransactionType::transfer(),
        )
    }

    #[test]
    fn test_status_forward_only() {
        assert!(QuoteStatus::Received.can_transition_to(QuoteStatus::Pending));
        assert!(QuoteStatus::Received.can_transition_to(QuoteStatus::Accepted));
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Pending));
        assert!(!QuoteStatus::Pending.can_transition_to(QuoteStatus::Received));
        assert!(!QuoteStatus::Accepted.can_transition_to(QuoteStatus::Rejected));
        assert!(!QuoteStatus::Expired.can_transition_to(QuoteStatus::Expired));
    }

    #[test]
    fn test_quote_transition() {
        let mut quote = test_quote("q1");
        quote.transition_to(QuoteStatus::Received).unwrap();
        quote.transition_to(QuoteStatus::Accepted).unwrap();
        assert!(quote.is_terminal());
        assert!(quote.transition_to(QuoteStatus::Pending).is_err());
        assert_eq!(quote.status, Some(QuoteStatus::Accepted));
    }

    #[test]
    fn test_quote_expiry() {
        let mut quote = test_quote("q1");
        let now = Utc::now();
        assert!(!quote.is_expired_at(now));

        quote.expiration = Some(now - chrono::Duration::seconds(1));
        assert!(quote.is_expired_at(now));
    }

    #[test]
    fn test_quote_serializes_camel_case() {
        let quote = test_quote("q1");
        let json = serde_json::to_value(&quote).unwrap();

        assert_eq!(json["quoteId"], "q1");
        assert_eq!(json["requesterFspId"], "payerfsp");
        assert_eq!(json["amountType"], "SEND");
        assert!(json.get("bulkQuoteId").is_none());
    }

    #[test]
    fn test_bulk_settled_status() {
        let mut bulk = BulkQuote::new("b1", Party::new("MSISDN", "111"));
        let mut q1 = test_quote("q1");
        let mut q2 = test_quote("q2");
        q1.status = Some(QuoteStatus::Accepted);
        q2.status = Some(QuoteStatus::Received);
        bulk.individual_quotes = vec![q1, q2];

        assert_eq!(bulk.settled_status(), QuoteStatus::Pending);

        bulk.individual_quotes[1].status = Some(QuoteStatus::Rejected);
        assert_eq!(bulk.settled_status(), QuoteStatus::Accepted);
    }

    #[test]
    fn test_bulk_exclusion_invariant() {
        let mut bulk = BulkQuote::new("b1", Party::new("MSISDN", "111"));
        bulk.individual_quotes = vec![test_quote("q1")];
        bulk.quotes_not_processed_ids = vec!["q2".to_string()];
        assert!(bulk.check_exclusions().is_ok());

        bulk.quotes_not_processed_ids.push("q1".to_string());
        assert!(bulk.check_exclusions().is_err());
    }

    #[test]
    fn test_participant_deserialize_defaults_approved() {
        let json = r#"{"id":"bluebank","type":"DFSP","isActive":false}"#;
        let participant: Participant = serde_json::from_str(json).unwrap();

        assert_eq!(participant.id, "bluebank");
        assert!(!participant.is_active);
        assert!(participant.approved);
    }
}
