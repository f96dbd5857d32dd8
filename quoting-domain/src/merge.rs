//! Field-level merge used by repository updates.
//!
//! Precedence: an incoming `Some` replaces the stored value, an incoming `None`
//! keeps it. Identity and `created_at` are never taken from the incoming record.
//! A status may only move forward; stores call [`Merge::check_merge`] first.

use crate::entities::{BulkQuote, Quote, QuoteStatus};
use crate::value_objects::DomainError;
use chrono::Utc;

/// Merge a partial update into a stored record
pub trait Merge {
    /// Reject an update that would move the status backward or out of a terminal state
    fn check_merge(&self, incoming: &Self) -> Result<(), DomainError>;

    /// Apply `incoming` over `self`
    fn merge_from(&mut self, incoming: Self);
}

fn check_status(
    current: Option<QuoteStatus>,
    incoming: Option<QuoteStatus>,
    id: &str,
) -> Result<(), DomainError> {
    match (current, incoming) {
        (Some(current), Some(next)) if !current.accepts_update(next) => Err(
            DomainError::InvalidStateTransition(format!("{}: {} → {}", id, current, next)),
        ),
        _ => Ok(()),
    }
}

fn merge_opt<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

fn merge_str(current: &mut String, incoming: String) {
    if !incoming.is_empty() {
        *current = incoming;
    }
}

impl Merge for Quote {
    fn check_merge(&self, incoming: &Self) -> Result<(), DomainError> {
        check_status(self.status, incoming.status, &self.quote_id)
    }

    fn merge_from(&mut self, incoming: Self) {
        merge_str(&mut self.transaction_id, incoming.transaction_id);
        merge_opt(&mut self.transaction_request_id, incoming.transaction_request_id);
        merge_opt(&mut self.bulk_quote_id, incoming.bulk_quote_id);
        merge_str(&mut self.requester_fsp_id, incoming.requester_fsp_id);
        merge_str(&mut self.destination_fsp_id, incoming.destination_fsp_id);
        self.payer = incoming.payer;
        self.payee = incoming.payee;
        self.amount_type = incoming.amount_type;
        self.amount = incoming.amount;
        self.transaction_type = incoming.transaction_type;
        merge_opt(&mut self.fees, incoming.fees);
        merge_opt(&mut self.note, incoming.note);
        merge_opt(&mut self.geo_code, incoming.geo_code);
        merge_opt(&mut self.expiration, incoming.expiration);
        merge_opt(&mut self.extension_list, incoming.extension_list);
        merge_opt(&mut self.transfer_amount, incoming.transfer_amount);
        merge_opt(&mut self.payee_receive_amount, incoming.payee_receive_amount);
        merge_opt(&mut self.payee_fsp_fee, incoming.payee_fsp_fee);
        merge_opt(&mut self.payee_fsp_commission, incoming.payee_fsp_commission);
        merge_opt(&mut self.ilp_packet, incoming.ilp_packet);
        merge_opt(&mut self.condition, incoming.condition);
        merge_opt(&mut self.status, incoming.status);
        merge_opt(&mut self.error_information, incoming.error_information);
        if !incoming.protocol_state.is_empty() {
            self.protocol_state = incoming.protocol_state;
        }
        self.updated_at = Utc::now();
    }
}

impl Merge for BulkQuote {
    fn check_merge(&self, incoming: &Self) -> Result<(), DomainError> {
        check_status(self.status, incoming.status, &self.bulk_quote_id)
    }

    fn merge_from(&mut self, incoming: Self) {
        self.payer = incoming.payer;
        merge_opt(&mut self.geo_code, incoming.geo_code);
        merge_opt(&mut self.expiration, incoming.expiration);
        if !incoming.individual_quotes.is_empty() {
            self.individual_quotes = incoming.individual_quotes;
        }
        // Exclusions only grow
        for id in incoming.quotes_not_processed_ids {
            if !self.quotes_not_processed_ids.contains(&id) {
                self.quotes_not_processed_ids.push(id);
            }
        }
        merge_opt(&mut self.status, incoming.status);
        merge_opt(&mut self.error_information, incoming.error_information);
        merge_opt(&mut self.extension_list, incoming.extension_list);
        if !incoming.protocol_state.is_empty() {
            self.protocol_state = incoming.protocol_state;
        }
        self.updated_at = Utc::now();
    }
}
