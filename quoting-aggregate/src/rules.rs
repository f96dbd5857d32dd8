//! Pure validation rules, deterministic, no I/O.
//!
//! Participant checks and scheme checks both return a [`QuotingError`]
//! carrying the taxonomy code the aggregate reports.

use quoting_domain::{Currency, ErrorCode, Money, Participant, QuotingError};
use rust_decimal::Decimal;

// =============================================================================
// Participants
// =============================================================================

/// Side of the exchange a participant is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    /// The FSP sending the message
    Source,
    /// The FSP the message is addressed to
    Destination,
}

impl ParticipantRole {
    fn codes(&self) -> [ErrorCode; 4] {
        match self {
            ParticipantRole::Source => [
                ErrorCode::SourceParticipantNotFound,
                ErrorCode::RequiredSourceParticipantIdMismatch,
                ErrorCode::RequiredSourceParticipantNotApproved,
                ErrorCode::RequiredSourceParticipantNotActive,
            ],
            ParticipantRole::Destination => [
                ErrorCode::DestinationParticipantNotFound,
                ErrorCode::RequiredDestinationParticipantIdMismatch,
                ErrorCode::RequiredDestinationParticipantNotApproved,
                ErrorCode::RequiredDestinationParticipantNotActive,
            ],
        }
    }

    /// Code reported when the participant id is absent from the message
    pub fn missing_code(&self) -> ErrorCode {
        match self {
            ParticipantRole::Source => ErrorCode::InvalidSourceParticipant,
            ParticipantRole::Destination => ErrorCode::InvalidDestinationParticipant,
        }
    }
}

/// Check a resolved participant against the id the message named.
///
/// Order: not found, id mismatch, not approved, not active.
pub fn validate_participant(
    role: ParticipantRole,
    expected_id: &str,
    participant: Option<&Participant>,
) -> Result<(), QuotingError> {
    let [not_found, mismatch, not_approved, not_active] = role.codes();

    let participant = participant.ok_or_else(|| {
        QuotingError::new(not_found, format!("participant {} not found", expected_id))
    })?;

    if participant.id != expected_id {
        return Err(QuotingError::new(
            mismatch,
            format!("expected participant {}, registry returned {}", expected_id, participant.id),
        ));
    }
    if !participant.approved {
        return Err(QuotingError::new(
            not_approved,
            format!("participant {} is not approved", expected_id),
        ));
    }
    if !participant.is_active {
        return Err(QuotingError::new(
            not_active,
            format!("participant {} is not active", expected_id),
        ));
    }
    Ok(())
}

// =============================================================================
// Scheme rules
// =============================================================================

/// Currency and amount rules of the scheme
#[derive(Debug, Clone)]
pub struct SchemeRules {
    supported_currencies: Vec<Currency>,
}

impl SchemeRules {
    /// Create rules accepting `supported_currencies`
    pub fn new(supported_currencies: Vec<Currency>) -> Self {
        Self { supported_currencies }
    }

    /// Whether the scheme accepts `currency`
    pub fn is_supported(&self, currency: &Currency) -> bool {
        self.supported_currencies.contains(currency)
    }

    /// Check request amounts. The first amount is the principal and must be
    /// positive; the rest (fees) must not be negative.
    pub fn check_request(&self, amounts: &[&Money]) -> Result<(), QuotingError> {
        self.check(amounts, ErrorCode::RuleSchemeViolatedRequest)
    }

    /// Check response amounts, same shape as [`SchemeRules::check_request`].
    /// Results that carry no terms pass an empty list.
    pub fn check_response(&self, amounts: &[&Money]) -> Result<(), QuotingError> {
        self.check(amounts, ErrorCode::RuleSchemeViolatedResponse)
    }

    fn check(&self, amounts: &[&Money], code: ErrorCode) -> Result<(), QuotingError> {
        for (index, money) in amounts.iter().enumerate() {
            if !self.is_supported(&money.currency) {
                return Err(QuotingError::new(
                    code,
                    format!("currency {} is not supported", money.currency),
                ));
            }
            if index == 0 && !money.is_positive() {
                return Err(QuotingError::new(code, format!("amount {} must be positive", money)));
            }
            if money.amount < Decimal::ZERO {
                return Err(QuotingError::new(code, format!("amount {} is negative", money)));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(amount: Decimal) -> Money {
        Money::new(Currency::new("USD").unwrap(), amount)
    }

    fn rules() -> SchemeRules {
        SchemeRules::new(vec![Currency::new("USD").unwrap(), Currency::new("EUR").unwrap()])
    }

    #[test]
    fn test_participant_checks_in_order() {
        let mut participant = Participant::active("payerfsp");
        assert!(validate_participant(ParticipantRole::Source, "payerfsp", Some(&participant)).is_ok());

        let err = validate_participant(ParticipantRole::Source, "payerfsp", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::SourceParticipantNotFound);

        let err =
            validate_participant(ParticipantRole::Destination, "other", Some(&participant))
                .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredDestinationParticipantIdMismatch);

        participant.is_active = false;
        participant.approved = false;
        let err = validate_participant(ParticipantRole::Source, "payerfsp", Some(&participant))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredSourceParticipantNotApproved);

        participant.approved = true;
        let err = validate_participant(ParticipantRole::Source, "payerfsp", Some(&participant))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredSourceParticipantNotActive);
    }

    #[test]
    fn test_scheme_accepts_supported_positive_amounts() {
        let amount = usd(dec!(10));
        let fee = usd(dec!(0));
        assert!(rules().check_request(&[&amount, &fee]).is_ok());
    }

    #[test]
    fn test_scheme_rejects_unsupported_currency() {
        let amount = Money::new(Currency::new("GBP").unwrap(), dec!(10));

        let err = rules().check_request(&[&amount]).unwrap_err();
        assert_eq!(err.code, ErrorCode::RuleSchemeViolatedRequest);

        let err = rules().check_response(&[&amount]).unwrap_err();
        assert_eq!(err.code, ErrorCode::RuleSchemeViolatedResponse);
    }

    #[test]
    fn test_scheme_rejects_non_positive_principal_and_negative_fee() {
        let zero = usd(dec!(0));
        assert!(rules().check_request(&[&zero]).is_err());

        let amount = usd(dec!(5));
        let negative_fee = usd(dec!(-1));
        assert!(rules().check_request(&[&amount, &negative_fee]).is_err());
    }
}
