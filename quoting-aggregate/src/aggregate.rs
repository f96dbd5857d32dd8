//! Quoting Aggregate
//!
//! Owns the quote lifecycle. Every inbound message produces exactly one
//! outbound message: the success event, or a `QuotingErrorEvt` describing the
//! business failure. Infrastructure failures abort the whole batch.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::{join, join_all};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use quoting_connectors::{AccountResolver, ParticipantResolver};
use quoting_domain::{
    names, Currency, ErrorCode, FspId, InboundMessage, Money, OutboundMessage, Participant, Party,
    Quote, QuoteQueryReceived, QuoteRejected, QuoteRejectedResponse, QuoteRequestReceived,
    QuoteResponseReceived, QuoteStatus, QuotingEvent,
};
use quoting_store::{BulkQuoteRepository, QuoteRepository};

use crate::config::AggregateConfig;
use crate::error::{AggregateError, AggregateResult};
use crate::outcome::{check_party, parse_payload, Failure, MessageContext};
use crate::rules::{validate_participant, ParticipantRole, SchemeRules};

// =============================================================================
// Command Processor
// =============================================================================

/// Processes a batch of inbound messages into outbound messages.
///
/// The output has one entry per input, in input order.
#[async_trait]
pub trait CommandProcessor: Send + Sync {
    async fn process_batch(
        &self,
        messages: Vec<InboundMessage>,
    ) -> AggregateResult<Vec<OutboundMessage>>;
}

// =============================================================================
// Aggregate
// =============================================================================

/// The quoting aggregate. All collaborators are injected.
pub struct QuotingAggregate {
    pub(crate) config: AggregateConfig,
    pub(crate) rules: SchemeRules,
    pub(crate) quotes: Arc<dyn QuoteRepository>,
    pub(crate) bulk_quotes: Arc<dyn BulkQuoteRepository>,
    pub(crate) participants: Arc<dyn ParticipantResolver>,
    pub(crate) accounts: Arc<dyn AccountResolver>,
}

impl QuotingAggregate {
    /// Create an aggregate over its repositories and resolvers
    pub fn new(
        config: AggregateConfig,
        quotes: Arc<dyn QuoteRepository>,
        bulk_quotes: Arc<dyn BulkQuoteRepository>,
        participants: Arc<dyn ParticipantResolver>,
        accounts: Arc<dyn AccountResolver>,
    ) -> Self {
        let rules = SchemeRules::new(config.supported_currencies.clone());
        Self { config, rules, quotes, bulk_quotes, participants, accounts }
    }

    /// Business configuration in effect
    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    /// Process one message. `Err` only for infrastructure failures.
    pub async fn process_message(&self, message: InboundMessage) -> AggregateResult<OutboundMessage> {
        let mut ctx = MessageContext::from_message(&message);

        let result = match message.msg_name.as_str() {
            names::QUOTE_REQUEST_RECEIVED => self.handle_quote_request(&message, &mut ctx).await,
            names::QUOTE_RESPONSE_RECEIVED => self.handle_quote_response(&message, &mut ctx).await,
            names::QUOTE_QUERY_RECEIVED => self.handle_quote_query(&message, &mut ctx).await,
            names::QUOTE_REJECTED => self.handle_quote_rejected(&message, &mut ctx).await,
            names::BULK_QUOTE_REQUESTED => {
                self.handle_bulk_quote_request(&message, &mut ctx).await
            },
            names::BULK_QUOTE_PENDING_RECEIVED => {
                self.handle_bulk_quote_pending(&message, &mut ctx).await
            },
            names::BULK_QUOTE_QUERY_RECEIVED => {
                self.handle_bulk_quote_query(&message, &mut ctx).await
            },
            names::BULK_QUOTE_REJECTED => {
                self.handle_bulk_quote_rejected(&message, &mut ctx).await
            },
            other => Err(Failure::business(
                ErrorCode::InvalidMessageType,
                format!("unknown message name {}", other),
            )),
        };

        let header = message.fspiop_opaque_state;
        match result {
            Ok(event) => {
                debug!(
                    source_event = %ctx.source_event,
                    event = event.name(),
                    "Message processed"
                );
                Ok(OutboundMessage::new(event, header))
            },
            Err(Failure::Business(err)) => {
                warn!(
                    source_event = %ctx.source_event,
                    code = err.code.name(),
                    quote_id = ?ctx.quote_id,
                    bulk_quote_id = ?ctx.bulk_quote_id,
                    error = %err.message,
                    "Message rejected"
                );
                Ok(OutboundMessage::new(QuotingEvent::Error(ctx.error_event(err)), header))
            },
            Err(Failure::Fatal(err)) => {
                error!(source_event = %ctx.source_event, error = %err, "Message processing failed");
                Err(err)
            },
        }
    }

    // =========================================================================
    // Shared validation
    // =========================================================================

    /// Resolve and validate the participants. No lookup in pass-through mode.
    pub(crate) async fn validate_participants(
        &self,
        requester: &str,
        destination: Option<&str>,
    ) -> Result<(), Failure> {
        if self.config.pass_through_mode {
            return Ok(());
        }

        match destination {
            Some(destination) => {
                let (source, target) = join(
                    self.participants.get_participant_info(requester),
                    self.participants.get_participant_info(destination),
                )
                .await;
                validate_participant(ParticipantRole::Source, requester, source.as_ref())?;
                validate_participant(ParticipantRole::Destination, destination, target.as_ref())?;
            },
            None => {
                let source = self.participants.get_participant_info(requester).await;
                validate_participant(ParticipantRole::Source, requester, source.as_ref())?;
            },
        }
        Ok(())
    }

    /// Resolve many participants in one lookup. Empty in pass-through mode.
    pub(crate) async fn resolve_participants(
        &self,
        fsp_ids: &[FspId],
    ) -> HashMap<FspId, Participant> {
        if self.config.pass_through_mode || fsp_ids.is_empty() {
            return HashMap::new();
        }
        self.participants
            .get_participants_info(fsp_ids)
            .await
            .into_iter()
            .map(|participant| (participant.id.clone(), participant))
            .collect()
    }

    /// Validate a destination against participants resolved up front
    pub(crate) fn check_destination(
        &self,
        destination: &str,
        resolved: &HashMap<FspId, Participant>,
    ) -> Result<(), Failure> {
        if self.config.pass_through_mode {
            return Ok(());
        }
        validate_participant(ParticipantRole::Destination, destination, resolved.get(destination))?;
        Ok(())
    }

    pub(crate) fn check_request_scheme(&self, amounts: &[&Money]) -> Result<(), Failure> {
        if self.config.pass_through_mode {
            return Ok(());
        }
        Ok(self.rules.check_request(amounts)?)
    }

    pub(crate) fn check_response_scheme(&self, amounts: &[&Money]) -> Result<(), Failure> {
        if self.config.pass_through_mode {
            return Ok(());
        }
        Ok(self.rules.check_response(amounts)?)
    }

    /// Ask the account lookup service which FSP owns the payee's account
    async fn lookup_payee_fsp(
        &self,
        payee: &Party,
        currency: &Currency,
    ) -> Result<Option<FspId>, Failure> {
        let info = &payee.party_id_info;
        let fsp_id = self
            .accounts
            .get_account_lookup(&info.party_identifier, &info.party_id_type, Some(currency.code()))
            .await?;
        Ok(fsp_id)
    }

    async fn load_quote(&self, quote_id: &str) -> Result<Quote, Failure> {
        self.quotes
            .get_quote_by_id(quote_id)
            .await
            .map_err(|e| Failure::on_read(e, ErrorCode::UnableToGetQuote))?
            .ok_or_else(|| {
                Failure::business(ErrorCode::QuoteNotFound, format!("quote {} not found", quote_id))
            })
    }

    async fn save_quote(&self, quote: Quote) -> Result<Quote, Failure> {
        self.quotes.update_quote(quote).await.map_err(|e| {
            Failure::on_update(e, ErrorCode::QuoteNotFound, ErrorCode::UnableToUpdateQuote)
        })
    }

    // =========================================================================
    // Quote handlers
    // =========================================================================

    async fn handle_quote_request(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let request: QuoteRequestReceived = parse_payload(message)?;
        ctx.quote_id = Some(request.quote_id.clone());
        check_party(&request.payer)?;
        check_party(&request.payee)?;

        if ctx.requester_fsp_id.is_none() {
            ctx.requester_fsp_id = request.payer.fsp_id().map(str::to_string);
        }
        let requester = ctx.require_requester()?;

        if ctx.destination_fsp_id.is_none() {
            ctx.destination_fsp_id = match request.payee.fsp_id() {
                Some(fsp_id) => Some(fsp_id.to_string()),
                None => self.lookup_payee_fsp(&request.payee, &request.amount.currency).await?,
            };
        }
        let destination = ctx.require_destination()?;

        self.validate_participants(&requester, Some(&destination)).await?;
        self.check_request_scheme(&request.money_fields())?;

        let mut quote = Quote::new(
            request.quote_id,
            request.transaction_id,
            requester,
            destination,
            request.payer,
            request.payee,
            request.amount_type,
            request.amount,
            request.transaction_type,
        );
        quote.transaction_request_id = request.transaction_request_id;
        quote.fees = request.fees;
        quote.note = request.note;
        quote.geo_code = request.geo_code;
        quote.expiration = request.expiration;
        quote.extension_list = request.extension_list;
        quote.protocol_state = message.fspiop_opaque_state.extra.clone();
        quote.transition_to(QuoteStatus::Received).map_err(Failure::invalid_state)?;

        quote.quote_id = self.quotes.add_quote(quote.clone()).await.map_err(|e| {
            Failure::on_add(e, ErrorCode::DuplicateQuote, ErrorCode::UnableToAddQuote)
        })?;
        ctx.quote_id = Some(quote.quote_id.clone());

        info!(
            quote_id = %quote.quote_id,
            requester = %quote.requester_fsp_id,
            destination = %quote.destination_fsp_id,
            "Quote request accepted"
        );
        Ok(QuotingEvent::QuoteRequestAccepted(quote))
    }

    async fn handle_quote_response(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let response: QuoteResponseReceived = parse_payload(message)?;
        ctx.quote_id = Some(response.quote_id.clone());
        let requester = ctx.require_requester()?;
        let destination = ctx.require_destination()?;

        self.validate_participants(&requester, Some(&destination)).await?;
        self.check_response_scheme(&response.money_fields())?;

        let mut quote = self.load_quote(&response.quote_id).await?;
        if quote.is_terminal() {
            info!(quote_id = %quote.quote_id, status = ?quote.status, "Quote already settled, replaying");
            return Ok(QuotingEvent::QuoteResponseAccepted(quote));
        }

        if quote.is_expired_at(Utc::now()) {
            let quote_id = quote.quote_id.clone();
            quote.transition_to(QuoteStatus::Expired).map_err(Failure::invalid_state)?;
            self.save_quote(quote).await?;
            return Err(Failure::business(
                ErrorCode::QuoteExpired,
                format!("quote {} expired before the response arrived", quote_id),
            ));
        }

        quote.transfer_amount = Some(response.transfer_amount);
        quote.expiration = Some(response.expiration);
        quote.ilp_packet = Some(response.ilp_packet);
        quote.condition = Some(response.condition);
        quote.payee_receive_amount = response.payee_receive_amount;
        quote.payee_fsp_fee = response.payee_fsp_fee;
        quote.payee_fsp_commission = response.payee_fsp_commission;
        if response.geo_code.is_some() {
            quote.geo_code = response.geo_code;
        }
        if response.extension_list.is_some() {
            quote.extension_list = response.extension_list;
        }
        quote.transition_to(QuoteStatus::Accepted).map_err(Failure::invalid_state)?;

        let quote = self.save_quote(quote).await?;
        info!(quote_id = %quote.quote_id, "Quote response accepted");
        Ok(QuotingEvent::QuoteResponseAccepted(quote))
    }

    async fn handle_quote_query(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let query: QuoteQueryReceived = parse_payload(message)?;
        ctx.quote_id = Some(query.quote_id.clone());
        let requester = ctx.require_requester()?;
        let destination = ctx.require_destination()?;

        self.validate_participants(&requester, Some(&destination)).await?;

        let quote = self.load_quote(&query.quote_id).await?;
        Ok(QuotingEvent::QuoteQueryResponse(quote))
    }

    async fn handle_quote_rejected(
        &self,
        message: &InboundMessage,
        ctx: &mut MessageContext,
    ) -> Result<QuotingEvent, Failure> {
        let rejection: QuoteRejected = parse_payload(message)?;
        ctx.quote_id = Some(rejection.quote_id.clone());
        ctx.require_requester()?;
        ctx.require_destination()?;

        let mut quote = self.load_quote(&rejection.quote_id).await?;
        if quote.is_terminal() {
            info!(quote_id = %quote.quote_id, status = ?quote.status, "Quote already settled, replaying");
            return Ok(QuotingEvent::QuoteRejectedResponse(QuoteRejectedResponse {
                error_information: quote
                    .error_information
                    .unwrap_or(rejection.error_information),
                quote_id: quote.quote_id,
            }));
        }

        quote.error_information = Some(rejection.error_information.clone());
        quote.transition_to(QuoteStatus::Rejected).map_err(Failure::invalid_state)?;
        let quote = self.save_quote(quote).await?;

        info!(
            quote_id = %quote.quote_id,
            error_code = %rejection.error_information.error_code,
            "Quote rejected"
        );
        Ok(QuotingEvent::QuoteRejectedResponse(QuoteRejectedResponse {
            quote_id: quote.quote_id,
            error_information: rejection.error_information,
        }))
    }
}

// =============================================================================
// Batch processing
// =============================================================================

/// Group messages by entity key, keeping arrival order inside each group.
/// Messages without a key each form their own group.
fn group_by_entity(messages: Vec<InboundMessage>) -> Vec<Vec<(usize, InboundMessage)>> {
    let mut groups: Vec<Vec<(usize, InboundMessage)>> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (position, message) in messages.into_iter().enumerate() {
        match message.entity_key() {
            Some(key) => match slots.get(&key) {
                Some(&slot) => groups[slot].push((position, message)),
                None => {
                    slots.insert(key, groups.len());
                    groups.push(vec![(position, message)]);
                },
            },
            None => groups.push(vec![(position, message)]),
        }
    }
    groups
}

#[async_trait]
impl CommandProcessor for QuotingAggregate {
    async fn process_batch(
        &self,
        messages: Vec<InboundMessage>,
    ) -> AggregateResult<Vec<OutboundMessage>> {
        let total = messages.len();
        let groups = group_by_entity(messages);
        debug!(messages = total, groups = groups.len(), "Processing batch");

        let runs = groups.into_iter().map(|group| async move {
            let mut outputs = Vec::with_capacity(group.len());
            for (position, message) in group {
                outputs.push((position, self.process_message(message).await?));
            }
            Ok::<_, AggregateError>(outputs)
        });

        let mut ordered = Vec::with_capacity(total);
        for run in join_all(runs).await {
            ordered.extend(run?);
        }
        ordered.sort_by_key(|(position, _)| *position);

        Ok(ordered.into_iter().map(|(_, output)| output).collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use quoting_domain::{FspiopOpaqueState, MessageType, Participant};
    use quoting_store::StoreError;
    use serde_json::json;

    fn error_code(output: &OutboundMessage) -> Option<ErrorCode> {
        output.event.error_code()
    }

    #[tokio::test]
    async fn test_quote_request_accepted_and_persisted() {
        let h = Harness::new();

        let output = h
            .aggregate
            .process_message(quote_request("q1", header()))
            .await
            .unwrap();

        assert_eq!(output.msg_name(), names::QUOTE_REQUEST_ACCEPTED);
        assert_eq!(output.msg_type, MessageType::DomainEvent);
        assert_eq!(output.msg_key.as_deref(), Some("q1"));

        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(QuoteStatus::Received));
        assert_eq!(stored.requester_fsp_id, PAYER_FSP);
        assert_eq!(stored.destination_fsp_id, PAYEE_FSP);
    }

    #[tokio::test]
    async fn test_protocol_state_stored_and_echoed() {
        let h = Harness::new();
        let mut state = header();
        state.extra.0.insert("traceparent".into(), json!("00-abc-01"));

        let output = h.aggregate.process_message(quote_request("q1", state.clone())).await.unwrap();

        assert_eq!(output.fspiop_opaque_state, state);
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.protocol_state.0.get("traceparent"), Some(&json!("00-abc-01")));
    }

    #[tokio::test]
    async fn test_inactive_requester_is_rejected_without_persisting() {
        let h = Harness::new();
        let mut payer = Participant::active(PAYER_FSP);
        payer.is_active = false;
        h.participants.insert(payer);

        let output = h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::RequiredSourceParticipantNotActive));
        let QuotingEvent::Error(event) = &output.event else {
            panic!("expected error event");
        };
        assert_eq!(event.source_event, names::QUOTE_REQUEST_RECEIVED);
        assert_eq!(event.requester_fsp_id.as_deref(), Some(PAYER_FSP));
        assert_eq!(event.destination_fsp_id.as_deref(), Some(PAYEE_FSP));
        assert_eq!(event.quote_id.as_deref(), Some("q1"));
        assert_eq!(h.store.quote_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_destination_participant() {
        let h = Harness::new();
        let state = FspiopOpaqueState::new(PAYER_FSP, "ghostfsp");

        let output = h.aggregate.process_message(quote_request("q1", state)).await.unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::DestinationParticipantNotFound));
    }

    #[tokio::test]
    async fn test_pass_through_mode_skips_participant_lookup() {
        let h = Harness::with_config(pass_through());
        let mut payer = Participant::active(PAYER_FSP);
        payer.is_active = false;
        h.participants.insert(payer);

        let output = h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        assert_eq!(output.msg_name(), names::QUOTE_REQUEST_ACCEPTED);
        assert_eq!(h.participants.call_count(), 0);
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(QuoteStatus::Received));
        assert_eq!(stored.requester_fsp_id, PAYER_FSP);
    }

    #[tokio::test]
    async fn test_pass_through_mode_accepts_unknown_participants() {
        let h = Harness::with_config(pass_through());
        let state = FspiopOpaqueState::new("unknownfsp", "otherfsp");

        let output = h.aggregate.process_message(quote_request("q1", state)).await.unwrap();

        assert_eq!(output.msg_name(), names::QUOTE_REQUEST_ACCEPTED);
        assert_eq!(h.store.quote_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_currency_violates_scheme() {
        let h = Harness::new();
        let mut payload = quote_request_payload("q1");
        payload["amount"]["currency"] = json!("GBP");

        let output = h
            .aggregate
            .process_message(InboundMessage::command(
                names::QUOTE_REQUEST_RECEIVED,
                payload,
                header(),
            ))
            .await
            .unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::RuleSchemeViolatedRequest));
        assert_eq!(h.store.quote_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_requester_and_destination() {
        let h = Harness::new();

        let no_requester = FspiopOpaqueState::new("", PAYEE_FSP);
        let output = h
            .aggregate
            .process_message(quote_response("q1", no_requester))
            .await
            .unwrap();
        assert_eq!(error_code(&output), Some(ErrorCode::InvalidSourceParticipant));

        let no_destination = FspiopOpaqueState::new(PAYEE_FSP, "");
        let output = h
            .aggregate
            .process_message(quote_response("q1", no_destination))
            .await
            .unwrap();
        assert_eq!(error_code(&output), Some(ErrorCode::InvalidDestinationParticipant));
    }

    #[tokio::test]
    async fn test_destination_resolved_through_account_lookup() {
        let h = Harness::new();
        h.accounts.insert("MSISDN", "222", PAYEE_FSP);
        let mut payload = quote_request_payload("q1");
        payload["payee"]["partyIdInfo"]
            .as_object_mut()
            .unwrap()
            .remove("fspId");

        let output = h
            .aggregate
            .process_message(InboundMessage::command(
                names::QUOTE_REQUEST_RECEIVED,
                payload,
                FspiopOpaqueState::new(PAYER_FSP, ""),
            ))
            .await
            .unwrap();

        assert_eq!(output.msg_name(), names::QUOTE_REQUEST_ACCEPTED);
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.destination_fsp_id, PAYEE_FSP);
        assert_eq!(h.accounts.call_count(), 1);
    }

    #[tokio::test]
    async fn test_account_lookup_failure_is_fatal() {
        let h = Harness::new();
        h.accounts.set_fail_next(true);
        let mut payload = quote_request_payload("q1");
        payload["payee"]["partyIdInfo"]
            .as_object_mut()
            .unwrap()
            .remove("fspId");

        let result = h
            .aggregate
            .process_message(InboundMessage::command(
                names::QUOTE_REQUEST_RECEIVED,
                payload,
                FspiopOpaqueState::new(PAYER_FSP, ""),
            ))
            .await;

        assert!(matches!(result, Err(AggregateError::Resolver(_))));
    }

    #[tokio::test]
    async fn test_duplicate_quote_request() {
        let h = Harness::new();
        h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        let output = h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::DuplicateQuote));
        assert_eq!(h.store.quote_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_and_unknown_name() {
        let h = Harness::new();

        let output = h
            .aggregate
            .process_message(InboundMessage::command(
                names::QUOTE_REQUEST_RECEIVED,
                json!({ "quoteId": "q1", "amount": "ten" }),
                header(),
            ))
            .await
            .unwrap();
        assert_eq!(error_code(&output), Some(ErrorCode::InvalidMessagePayload));

        let output = h
            .aggregate
            .process_message(InboundMessage::command("SomethingElseEvt", json!({}), header()))
            .await
            .unwrap();
        assert_eq!(error_code(&output), Some(ErrorCode::InvalidMessageType));
    }

    #[tokio::test]
    async fn test_quote_response_accepts_quote() {
        let h = Harness::new();
        h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        let output = h
            .aggregate
            .process_message(quote_response("q1", response_header()))
            .await
            .unwrap();

        assert_eq!(output.msg_name(), names::QUOTE_RESPONSE_ACCEPTED);
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(QuoteStatus::Accepted));
        assert_eq!(stored.condition.as_deref(), Some("cond"));
        assert!(stored.transfer_amount.is_some());
        // Request fields survive the merge
        assert_eq!(stored.transaction_id, "tx-q1");
    }

    #[tokio::test]
    async fn test_quote_response_for_unknown_quote() {
        let h = Harness::new();

        let output = h
            .aggregate
            .process_message(quote_response("missing", response_header()))
            .await
            .unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::QuoteNotFound));
        assert_eq!(h.store.quote_count(), 0);
    }

    #[tokio::test]
    async fn test_terminal_replay_is_noop() {
        let h = Harness::new();
        h.aggregate.process_message(quote_request("q1", header())).await.unwrap();
        h.aggregate.process_message(quote_response("q1", response_header())).await.unwrap();
        let settled = h.store.get_quote_by_id("q1").await.unwrap().unwrap();

        let replay = h
            .aggregate
            .process_message(quote_response("q1", response_header()))
            .await
            .unwrap();

        assert_eq!(replay.msg_name(), names::QUOTE_RESPONSE_ACCEPTED);
        let after = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(after.updated_at, settled.updated_at);

        let rejected = h
            .aggregate
            .process_message(quote_rejected("q1", response_header()))
            .await
            .unwrap();
        assert_eq!(rejected.msg_name(), names::QUOTE_REJECTED_RESPONSE);
        let after = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(after.status, Some(QuoteStatus::Accepted));
    }

    #[tokio::test]
    async fn test_response_after_expiration_expires_quote() {
        let h = Harness::new();
        let mut payload = quote_request_payload("q1");
        payload["expiration"] = json!("2020-01-01T00:00:00Z");
        h.aggregate
            .process_message(InboundMessage::command(
                names::QUOTE_REQUEST_RECEIVED,
                payload,
                header(),
            ))
            .await
            .unwrap();

        let output = h
            .aggregate
            .process_message(quote_response("q1", response_header()))
            .await
            .unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::QuoteExpired));
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(QuoteStatus::Expired));
    }

    #[tokio::test]
    async fn test_quote_query_and_rejection() {
        let h = Harness::new();
        h.aggregate.process_message(quote_request("q1", header())).await.unwrap();

        let output = h.aggregate.process_message(quote_query("q1", header())).await.unwrap();
        let QuotingEvent::QuoteQueryResponse(quote) = &output.event else {
            panic!("expected query response");
        };
        assert_eq!(quote.quote_id, "q1");

        let output = h
            .aggregate
            .process_message(quote_rejected("q1", response_header()))
            .await
            .unwrap();
        assert_eq!(output.msg_name(), names::QUOTE_REJECTED_RESPONSE);
        let stored = h.store.get_quote_by_id("q1").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(QuoteStatus::Rejected));
        assert!(stored.error_information.is_some());
    }

    #[tokio::test]
    async fn test_store_outage_is_fatal() {
        let aggregate = failing_aggregate(StoreError::Connection("down".into()));

        let result = aggregate.process_message(quote_query("q1", header())).await;

        assert!(matches!(result, Err(AggregateError::Store(StoreError::Connection(_)))));
    }

    #[tokio::test]
    async fn test_add_failure_reports_unable_to_add() {
        let aggregate = failing_aggregate(StoreError::Database("disk full".into()));

        let output = aggregate.process_message(quote_request("q1", header())).await.unwrap();

        assert_eq!(error_code(&output), Some(ErrorCode::UnableToAddQuote));
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_serializes_per_entity() {
        let h = Harness::new();
        let batch = vec![
            quote_request("q1", header()),
            quote_request("q2", header()),
            quote_response("q1", response_header()),
            quote_query("missing", header()),
            quote_response("q2", response_header()),
        ];

        let outputs = h.aggregate.process_batch(batch).await.unwrap();

        let emitted: Vec<&str> = outputs.iter().map(OutboundMessage::msg_name).collect();
        assert_eq!(
            emitted,
            vec![
                names::QUOTE_REQUEST_ACCEPTED,
                names::QUOTE_REQUEST_ACCEPTED,
                names::QUOTE_RESPONSE_ACCEPTED,
                names::QUOTING_ERROR,
                names::QUOTE_RESPONSE_ACCEPTED,
            ]
        );
        let keys: Vec<Option<&str>> = outputs.iter().map(|o| o.msg_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("q1"), Some("q2"), Some("q1"), Some("missing"), Some("q2")]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let h = Harness::new();
        let outputs = h.aggregate.process_batch(Vec::new()).await.unwrap();
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_group_by_entity() {
        let messages = vec![
            quote_query("a", header()),
            quote_query("b", header()),
            quote_query("a", header()),
            InboundMessage::command("X", json!({}), header()),
        ];

        let groups = group_by_entity(messages);

        let positions: Vec<Vec<usize>> =
            groups.iter().map(|g| g.iter().map(|(p, _)| *p).collect()).collect();
        assert_eq!(positions, vec![vec![0, 2], vec![1], vec![3]]);
    }
}
