//! Value Objects for the Quoting Domain
//!
//! Immutable, validated primitives shared by quotes and bulk quotes.
//! Wire names follow the FSPIOP camelCase convention.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Currency code is not a 3-letter ISO 4217 code
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Party identifier is malformed
    #[error("Invalid party: {0}")]
    InvalidParty(String),

    /// Invalid status transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Currency
// =============================================================================

/// ISO 4217 currency code (e.g., USD)
///
/// # Invariants
/// - Exactly three ASCII uppercase letters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a Currency with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCurrency` if the code is not three uppercase letters
    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::InvalidCurrency(format!(
                "Expected 3 uppercase letters, got '{}'",
                code
            )));
        }
        Ok(Self(code))
    }

    /// Get the currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Money
// =============================================================================

/// An amount in a given currency.
///
/// Construction does not reject zero or negative amounts: a malformed amount on
/// the wire is a scheme violation, reported by the rules layer, not a payload error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: Currency,
    pub amount: Decimal,
}

impl Money {
    /// Create a new Money value
    pub fn new(currency: Currency, amount: Decimal) -> Self {
        Self { currency, amount }
    }

    /// Whether the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

// =============================================================================
// AmountType
// =============================================================================

/// Whether the amount is what the payer sends or what the payee receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmountType {
    /// Amount the payer wants to send
    Send,
    /// Amount the payee should receive
    Receive,
}

impl AmountType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountType::Send => "SEND",
            AmountType::Receive => "RECEIVE",
        }
    }
}

impl fmt::Display for AmountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Party
// =============================================================================

/// Identifies a party and, optionally, the FSP that owns its account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyIdInfo {
    /// Identifier type (e.g., MSISDN, IBAN)
    pub party_id_type: String,
    /// Identifier value
    pub party_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_sub_id_or_type: Option<String>,
    /// FSP owning the account, when known by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsp_id: Option<String>,
}

impl PartyIdInfo {
    /// Check that type and identifier are present
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.party_id_type.trim().is_empty() {
            return Err(DomainError::InvalidParty("partyIdType is empty".to_string()));
        }
        if self.party_identifier.trim().is_empty() {
            return Err(DomainError::InvalidParty("partyIdentifier is empty".to_string()));
        }
        Ok(())
    }
}

/// Party descriptor for payer or payee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub party_id_info: PartyIdInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_classification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Personal details, carried through without interpretation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_info: Option<serde_json::Value>,
}

impl Party {
    /// Create a party from its identifier only
    pub fn new(party_id_type: impl Into<String>, party_identifier: impl Into<String>) -> Self {
        Self {
            party_id_info: PartyIdInfo {
                party_id_type: party_id_type.into(),
                party_identifier: party_identifier.into(),
                party_sub_id_or_type: None,
                fsp_id: None,
            },
            merchant_classification_code: None,
            name: None,
            personal_info: None,
        }
    }

    /// Same party with the owning FSP set
    pub fn with_fsp(mut self, fsp_id: impl Into<String>) -> Self {
        self.party_id_info.fsp_id = Some(fsp_id.into());
        self
    }

    /// FSP owning this party's account, if the sender supplied one
    pub fn fsp_id(&self) -> Option<&str> {
        self.party_id_info.fsp_id.as_deref()
    }
}

// =============================================================================
// Transaction type
// =============================================================================

/// Kind of transaction being quoted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionType {
    /// Scenario (e.g., TRANSFER, DEPOSIT)
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_scenario: Option<String>,
    /// PAYER or PAYEE
    pub initiator: String,
    /// CONSUMER, AGENT, BUSINESS or DEVICE
    pub initiator_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_of_payments: Option<String>,
}

impl TransactionType {
    /// A consumer-initiated P2P transfer
    pub fn transfer() -> Self {
        Self {
            scenario: "TRANSFER".to_string(),
            sub_scenario: None,
            initiator: "PAYER".to_string(),
            initiator_type: "CONSUMER".to_string(),
            balance_of_payments: None,
        }
    }
}

// =============================================================================
// Misc
// =============================================================================

/// Geographic location of the initiating device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCode {
    pub latitude: String,
    pub longitude: String,
}

/// Error details attached to a rejected quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInformation {
    pub error_code: String,
    pub error_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_list: Option<Vec<Extension>>,
}

impl ErrorInformation {
    /// Create error information without extensions
    pub fn new(error_code: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_description: error_description.into(),
            extension_list: None,
        }
    }
}

/// Key/value extension carried on FSPIOP resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub key: String,
    pub value: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_validation() {
        assert!(Currency::new("USD").is_ok());
        assert!(Currency::new("usd").is_err());
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("USDT").is_err());
    }

    #[test]
    fn test_currency_deserialize_rejects_invalid() {
        let ok: Result<Currency, _> = serde_json::from_str("\"EUR\"");
        assert_eq!(ok.unwrap().code(), "EUR");

        let bad: Result<Currency, _> = serde_json::from_str("\"euro\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_money_wire_format() {
        let money = Money::new(Currency::new("USD").unwrap(), dec!(10.50));
        let json = serde_json::to_value(&money).unwrap();

        assert_eq!(json["currency"], "USD");
        assert_eq!(json["amount"], "10.50");
        assert!(money.is_positive());
    }

    #[test]
    fn test_amount_type_wire_name() {
        let json = serde_json::to_string(&AmountType::Receive).unwrap();
        assert_eq!(json, "\"RECEIVE\"");
        assert_eq!(AmountType::Send.to_string(), "SEND");
    }

    #[test]
    fn test_party_id_info_validation() {
        let party = Party::new("MSISDN", "123456789");
        assert!(party.party_id_info.validate().is_ok());

        let empty = Party::new("MSISDN", " ");
        assert!(empty.party_id_info.validate().is_err());
    }

    #[test]
    fn test_party_with_fsp() {
        let party = Party::new("MSISDN", "123").with_fsp("bluebank");
        assert_eq!(party.fsp_id(), Some("bluebank"));

        let json = serde_json::to_value(&party).unwrap();
        assert_eq!(json["partyIdInfo"]["fspId"], "bluebank");
    }
}
