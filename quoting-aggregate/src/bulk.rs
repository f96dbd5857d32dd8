//! Bulk quote handlers.
//!
//! A bulk request fans out into individual quotes. Each item is validated
//! independently and concurrently; failing items are excluded permanently
//! through `quotesNotProcessedIds` instead of failing the whole bulk.
//! Pending results fan back in and settle the bulk status.
//!
//! The item quotes in the quote repository are authoritative; the copies
//! embedded in the bulk record are refreshed from them on every write.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use quoting_connectors::AccountLookupRequest;
use quoting_domain::{
    BulkQuote, BulkQuotePendingReceived, BulkQuoteQueryReceived, BulkQuoteRejected,
    BulkQuoteRejectedResponse, BulkQuoteRequested, ErrorCode, FspId, IndividualQuoteRequest,
    IndividualQuoteResult, InboundMessage, Participant, Quote, QuoteId, QuoteStatus, QuotingEvent,
};
use quoting_store::StoreError;

use crate::aggregate::QuotingAggregate;
use crate::outcome::{check_party, parse_payload, Failure, MessageContext};

impl QuotingAggregate {
    async fn load_bulk_quote(&self, bulk_quote_id: &str) -> Result<BulkQuote, Failure> {
        self.bulk_quotes
            .get_bulk_quote_by_id(bulk_quote_id)
            .await
            .map_err(|e| Failure::on_read(e, ErrorCode::UnableToGetBulkQuote))?
            .ok_or_else(|| {
                Failure::business(
                    ErrorCode::BulkQuoteNotFound,
                    format!("bulk quote {} not found", bulk_quote_id),
                )
            })
    }

    /// Stored item quotes of a bulk, by id
    async fn load_bulk_items(
        &self,
        bulk_quote_id: &str,
    ) -> Result<HashMap<QuoteId, Quote>, Failure> {
        let items = self
            .quotes
            .get_quotes_by_bulk_quote_id(bulk_quote_id)
            .await
            .map_err(|e| Failure::on_read(e, ErrorCode::UnableToGetQuote))?;
        Ok(items.into_iter().map(|quote| (quote.quote_id.clone(), quote)).collect())
    }

    /// Persist the items that changed, then the bulk
    async fn save_bulk_quote(
        &self,
        bulk: BulkQuote,
        changed: Vec<Quote>,
    ) -> Result<BulkQuote, Failure> {
        if !changed.is_empty() {
            self.quotes.update_quotes(changed).await.map_err(|e| {
                Failure::on_update(e, ErrorCode::QuoteNotFound, ErrorCode::UnableToUpdateQuote)
            })?;
        }
        self.bulk_quotes.update_bulk_quote(bulk).await.map_err(|e| {
            Failure::on_update(e, ErrorCode::BulkQuoteNotFound, ErrorCode::UnableToUpdateBulkQuote)
        })
    }

    /// Insert the items, then the bulk. Items are removed again when the
    /// bulk insert fails so a redelivery starts clean.
    async fn insert_bulk_quote(&self, bulk: &BulkQuote) -> Result<(), Failure> {
        self.quotes.add_quotes(bulk.individual_quotes.clone()).await.map_err(|e| {
            Failure::on_add(e, ErrorCode::DuplicateQuote, ErrorCode::UnableToAddQuote)
        })?;

        if let Err(e) = self.bulk_quotes.add_bulk_quote(bulk.clone()).await {
            warn!(
                bulk_quote_id = %bulk.bulk_quote_id,
                error = %e,
                "Bulk insert failed, removing its items"
            );
            for quote in &bulk.individual_quotes {
                match self.quotes.remove_quote(&quote.quote_id).await {
                    Ok(()) | Err(StoreError::NotFound { .. }) => {},
                    Err(err) => return Err(Failure::Fatal(err.into())),
                }
            }
            return Err(Failure::on_add(
                e,
                ErrorCode::DuplicateBulkQuote,
                ErrorCode::UnableToAddBulkQuote,
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    pub(crate) async fn handle_bulk_quote_request(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let mut request: BulkQuoteRequested = parse_payload(message)?;
        ctx.bulk_quote_id = Some(request.bulk_quote_id.clone());
        check_party(&request.payer)?;

        if ctx.requester_fsp_id.is_none() {
            ctx.requester_fsp_id = request.payer.fsp_id().map(str::to_string);
        }
        let requester = ctx.require_requester()?;

        let item_count = request.individual_quotes.len();
        if item_count == 0 || item_count > self.config.max_bulk_quotes {
            return Err(invalid_length(item_count, self.config.max_bulk_quotes));
        }
        check_unique_item_ids(&request.individual_quotes)?;

        self.validate_participants(&requester, None).await?;

        let existing = self
            .bulk_quotes
            .get_bulk_quote_by_id(&request.bulk_quote_id)
            .await
            .map_err(|e| Failure::on_read(e, ErrorCode::UnableToGetBulkQuote))?;
        if existing.is_some() {
            return Err(Failure::business(
                ErrorCode::DuplicateBulkQuote,
                format!("bulk quote {} already exists", request.bulk_quote_id),
            ));
        }

        let destinations = self
            .resolve_item_destinations(&request.individual_quotes, ctx.destination_fsp_id.as_deref())
            .await?;
        let distinct: BTreeSet<FspId> = destinations.values().flatten().cloned().collect();
        let distinct: Vec<FspId> = distinct.into_iter().collect();
        let participants = self.resolve_participants(&distinct).await;

        let checks = request.individual_quotes.iter().map(|item| {
            let destination = destinations.get(&item.quote_id).cloned().flatten();
            self.validate_item(item, destination, &participants)
        });
        let verdicts = join_all(checks).await;

        let items = std::mem::take(&mut request.individual_quotes);
        let mut processed = Vec::new();
        let mut excluded = Vec::new();
        for (item, verdict) in items.into_iter().zip(verdicts) {
            match verdict {
                Ok(destination) => {
                    processed.push(item_quote(item, &requester, destination, &request, message))
                },
                Err(Failure::Business(err)) => {
                    warn!(
                        bulk_quote_id = %request.bulk_quote_id,
                        quote_id = %item.quote_id,
                        code = err.code.name(),
                        error = %err.message,
                        "Individual quote excluded"
                    );
                    excluded.push(item.quote_id);
                },
                Err(fatal) => return Err(fatal),
            }
        }

        if processed.is_empty() || processed.len() > self.config.max_bulk_quotes {
            return Err(invalid_length(processed.len(), self.config.max_bulk_quotes));
        }

        let mut bulk = BulkQuote::new(request.bulk_quote_id, request.payer);
        bulk.geo_code = request.geo_code;
        bulk.expiration = request.expiration;
        bulk.extension_list = request.extension_list;
        bulk.protocol_state = message.fspiop_opaque_state.extra.clone();
        bulk.individual_quotes = processed;
        bulk.quotes_not_processed_ids = excluded;
        bulk.transition_to(QuoteStatus::Received).map_err(Failure::invalid_state)?;
        bulk.check_exclusions().map_err(Failure::invalid_state)?;

        self.insert_bulk_quote(&bulk).await?;

        info!(
            bulk_quote_id = %bulk.bulk_quote_id,
            processed = bulk.individual_quotes.len(),
            excluded = bulk.quotes_not_processed_ids.len(),
            "Bulk quote received"
        );
        Ok(QuotingEvent::BulkQuoteReceived(bulk))
    }

    /// Destination per item id. Items naming no payee FSP are resolved in a
    /// single bulk account lookup.
    async fn resolve_item_destinations(
        &self,
        items: &[IndividualQuoteRequest],
        header_destination: Option<&str>,
    ) -> Result<HashMap<QuoteId, Option<FspId>>, Failure> {
        let mut resolved = HashMap::with_capacity(items.len());
        let mut lookups = HashMap::new();

        for item in items {
            match item.payee.fsp_id().or(header_destination) {
                Some(fsp_id) => {
                    resolved.insert(item.quote_id.clone(), Some(fsp_id.to_string()));
                },
                None => {
                    let info = &item.payee.party_id_info;
                    lookups.insert(
                        item.quote_id.clone(),
                        AccountLookupRequest::new(
                            info.party_identifier.clone(),
                            info.party_id_type.clone(),
                            Some(item.amount.currency.code().to_string()),
                        ),
                    );
                },
            }
        }

        if !lookups.is_empty() {
            debug!(count = lookups.len(), "Resolving payee FSPs");
            resolved.extend(self.accounts.get_bulk_account_lookup(lookups).await?);
        }
        Ok(resolved)
    }

    /// Validate one item, returning its destination FSP
    async fn validate_item(
        &self,
        item: &IndividualQuoteRequest,
        destination: Option<FspId>,
        participants: &HashMap<FspId, Participant>,
    ) -> Result<FspId, Failure> {
        check_party(&item.payee)?;
        let destination = destination.ok_or_else(|| {
            Failure::business(
                ErrorCode::PayeeParticipantNotFound,
                format!("no FSP owns the payee of quote {}", item.quote_id),
            )
        })?;

        self.check_destination(&destination, participants)?;
        self.check_request_scheme(&item.money_fields())?;

        let existing = self
            .quotes
            .get_quote_by_id(&item.quote_id)
            .await
            .map_err(|e| Failure::on_read(e, ErrorCode::UnableToGetQuote))?;
        if existing.is_some() {
            return Err(Failure::business(
                ErrorCode::DuplicateQuote,
                format!("quote {} already exists", item.quote_id),
            ));
        }
        Ok(destination)
    }

    // =========================================================================
    // Fan-in
    // =========================================================================

    pub(crate) async fn handle_bulk_quote_pending(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let pending: BulkQuotePendingReceived = parse_payload(message)?;
        ctx.bulk_quote_id = Some(pending.bulk_quote_id.clone());
        let requester = ctx.require_requester()?;
        let destination = ctx.require_destination()?;

        self.validate_participants(&requester, Some(&destination)).await?;
        for result in &pending.individual_quote_results {
            self.check_response_scheme(&result.money_fields())?;
        }

        let mut bulk = self.load_bulk_quote(&pending.bulk_quote_id).await?;
        if bulk.is_terminal() {
            info!(bulk_quote_id = %bulk.bulk_quote_id, status = ?bulk.status, "Bulk quote already settled, replaying");
            return Ok(QuotingEvent::BulkQuoteAccepted(bulk));
        }

        if bulk.expiration.is_some_and(|exp| exp <= Utc::now()) {
            let bulk_quote_id = bulk.bulk_quote_id.clone();
            bulk.transition_to(QuoteStatus::Expired).map_err(Failure::invalid_state)?;
            self.save_bulk_quote(bulk, Vec::new()).await?;
            return Err(Failure::business(
                ErrorCode::BulkQuoteExpired,
                format!("bulk quote {} expired before the response arrived", bulk_quote_id),
            ));
        }

        let mut items = self.load_bulk_items(&bulk.bulk_quote_id).await?;
        let mut changed = Vec::new();
        for result in pending.individual_quote_results {
            if bulk.quotes_not_processed_ids.contains(&result.quote_id) {
                debug!(quote_id = %result.quote_id, "Ignoring result for excluded quote");
                continue;
            }
            let quote = items.get_mut(&result.quote_id).ok_or_else(|| {
                let detail =
                    format!("quote {} is not part of bulk {}", result.quote_id, bulk.bulk_quote_id);
                Failure::business(ErrorCode::IndividualQuoteNotFound, detail)
            })?;
            if quote.is_terminal() {
                debug!(quote_id = %quote.quote_id, status = ?quote.status, "Item already settled");
                continue;
            }
            apply_result(quote, result)?;
            changed.push(quote.clone());
        }
        refresh_items(&mut bulk, items);

        let settled = bulk.settled_status();
        bulk.transition_to(settled).map_err(Failure::invalid_state)?;
        if pending.expiration.is_some() {
            bulk.expiration = pending.expiration;
        }
        if pending.extension_list.is_some() {
            bulk.extension_list = pending.extension_list;
        }

        let updated = changed.len();
        let bulk = self.save_bulk_quote(bulk, changed).await?;
        info!(
            bulk_quote_id = %bulk.bulk_quote_id,
            updated,
            status = ?bulk.status,
            "Bulk quote results applied"
        );
        Ok(QuotingEvent::BulkQuoteAccepted(bulk))
    }

    pub(crate) async fn handle_bulk_quote_query(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let query: BulkQuoteQueryReceived = parse_payload(message)?;
        ctx.bulk_quote_id = Some(query.bulk_quote_id.clone());
        let requester = ctx.require_requester()?;
        let destination = ctx.require_destination()?;

        self.validate_participants(&requester, Some(&destination)).await?;

        let bulk = self.load_bulk_quote(&query.bulk_quote_id).await?;
        Ok(QuotingEvent::BulkQuoteQueryResponse(bulk))
    }

    pub(crate) async fn handle_bulk_quote_rejected(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let rejection: BulkQuoteRejected = parse_payload(message)?;
        ctx.bulk_quote_id = Some(rejection.bulk_quote_id.clone());
        ctx.require_requester()?;
        ctx.require_destination()?;

        let mut bulk = self.load_bulk_quote(&rejection.bulk_quote_id).await?;
        if bulk.is_terminal() {
            info!(bulk_quote_id = %bulk.bulk_quote_id, status = ?bulk.status, "Bulk quote already settled, replaying");
            return Ok(QuotingEvent::BulkQuoteRejectedResponse(BulkQuoteRejectedResponse {
                error_information: bulk.error_information.unwrap_or(rejection.error_information),
                bulk_quote_id: bulk.bulk_quote_id,
            }));
        }

        let mut items = self.load_bulk_items(&bulk.bulk_quote_id).await?;
        let mut changed = Vec::new();
        for quote in items.values_mut().filter(|q| !q.is_terminal()) {
            quote.error_information = Some(rejection.error_information.clone());
            quote.transition_to(QuoteStatus::Rejected).map_err(Failure::invalid_state)?;
            changed.push(quote.clone());
        }
        refresh_items(&mut bulk, items);
        bulk.error_information = Some(rejection.error_information.clone());
        bulk.transition_to(QuoteStatus::Rejected).map_err(Failure::invalid_state)?;

        let bulk = self.save_bulk_quote(bulk, changed).await?;
        info!(bulk_quote_id = %bulk.bulk_quote_id, "Bulk quote rejected");
        Ok(QuotingEvent::BulkQuoteRejectedResponse(BulkQuoteRejectedResponse {
            bulk_quote_id: bulk.bulk_quote_id,
            error_information: rejection.error_information,
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn invalid_length(count: usize, max: usize) -> Failure {
    Failure::business(
        ErrorCode::InvalidBulkQuoteLength,
        format!("bulk quote has {} processable quotes, expected 1..={}", count, max),
    )
}

fn check_unique_item_ids(items: &[IndividualQuoteRequest]) -> Result<(), Failure> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.quote_id.trim().is_empty() || !seen.insert(item.quote_id.as_str()) {
            return Err(Failure::business(
                ErrorCode::InvalidMessagePayload,
                format!("individual quote id {:?} is empty or repeated", item.quote_id),
            ));
        }
    }
    Ok(())
}

/// Replace the embedded item copies with their stored versions
fn refresh_items(bulk: &mut BulkQuote, mut items: HashMap<QuoteId, Quote>) {
    for embedded in &mut bulk.individual_quotes {
        if let Some(stored) = items.remove(&embedded.quote_id) {
            *embedded = stored;
        }
    }
}

/// Build the quote fanned out from one bulk item
fn item_quote(
    item: IndividualQuoteRequest,
    requester: &str,
    destination: FspId,
    request: &BulkQuoteRequested,
    message: &InboundMessage,
) -> Quote {
    let mut quote = Quote::new(
        item.quote_id,
        item.transaction_id,
        requester,
        destination,
        request.payer.clone(),
        item.payee,
        item.amount_type,
        item.amount,
        item.transaction_type,
    );
    quote.bulk_quote_id = Some(request.bulk_quote_id.clone());
    quote.fees = item.fees;
    quote.note = item.note;
    quote.extension_list = item.extension_list;
    quote.geo_code = request.geo_code.clone();
    quote.expiration = request.expiration;
    quote.protocol_state = message.fspiop_opaque_state.extra.clone();
    quote.status = Some(QuoteStatus::Received);
    quote
}

/// Apply a payee result to an item: error information rejects it, terms accept it
fn apply_result(quote: &mut Quote, result: IndividualQuoteResult) -> Result<(), Failure> {
    if let Some(error_information) = result.error_information {
        quote.error_information = Some(error_information);
        return quote.transition_to(QuoteStatus::Rejected).map_err(Failure::invalid_state);
    }

    if let Some(payee) = result.payee {
        quote.payee = payee;
    }
    if result.transfer_amount.is_some() {
        quote.transfer_amount = result.transfer_amount;
    }
    if result.payee_receive_amount.is_some() {
        quote.payee_receive_amount = result.payee_receive_amount;
    }
    if result.payee_fsp_fee.is_some() {
        quote.payee_fsp_fee = result.payee_fsp_fee;
    }
    if result.payee_fsp_commission.is_some() {
        quote.payee_fsp_commission = result.payee_fsp_commission;
    }
    if result.ilp_packet.is_some() {
        quote.ilp_packet = result.ilp_packet;
    }
    if result.condition.is_some() {
        quote.condition = result.condition;
    }
    if result.extension_list.is_some() {
        quote.extension_list = result.extension_list;
    }
    quote.transition_to(QuoteStatus::Accepted).map_err(Failure::invalid_state)
}

// =============================================================================
// Tests
// =============================================================================
