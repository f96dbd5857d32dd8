//! Fixtures shared by the aggregate tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quoting_connectors::{
    CachedAccountResolver, CachedParticipantResolver, StubAccountLookupService,
    StubParticipantService,
};
use quoting_domain::{
    names, AmountType, BulkQuote, BulkQuoteId, BulkQuotePendingReceived, BulkQuoteRequested,
    Currency, ErrorInformation, FspiopOpaqueState, InboundMessage, IndividualQuoteRequest,
    IndividualQuoteResult, Money, Participant, Party, Quote, QuoteId, QuoteRejected,
    QuoteRequestReceived, QuoteResponseReceived, TransactionType,
};
use quoting_store::{
    BulkQuoteRepository, MemoryStore, Page, PageRequest, QuoteRepository, QuoteSearchCriteria,
    SearchKeywords, StoreError,
};

use crate::{AggregateConfig, QuotingAggregate};

pub(crate) const PAYER_FSP: &str = "payerfsp";
pub(crate) const PAYEE_FSP: &str = "payeefsp";

// =============================================================================
// Harness
// =============================================================================

pub(crate) struct Harness {
    pub aggregate: QuotingAggregate,
    pub store: Arc<MemoryStore>,
    pub participants: Arc<StubParticipantService>,
    pub accounts: Arc<StubAccountLookupService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AggregateConfig::default())
    }

    pub fn with_config(config: AggregateConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let participants = Arc::new(StubParticipantService::new());
        participants.insert(Participant::active(PAYER_FSP));
        participants.insert(Participant::active(PAYEE_FSP));
        let accounts = Arc::new(StubAccountLookupService::new());

        let aggregate = QuotingAggregate::new(
            config,
            store.clone(),
            store.clone(),
            Arc::new(CachedParticipantResolver::new(participants.clone(), 60_000)),
            Arc::new(CachedAccountResolver::new(accounts.clone(), 60_000)),
        );

        Self { aggregate, store, participants, accounts }
    }
}

impl Harness {
    /// Harness whose aggregate writes through a [`FlakyStore`] over `store`
    pub fn flaky() -> (Self, Arc<FlakyStore>) {
        let mut harness = Self::new();
        let flaky = Arc::new(FlakyStore::new(harness.store.clone()));
        harness.aggregate = QuotingAggregate::new(
            AggregateConfig::default(),
            flaky.clone(),
            flaky.clone(),
            Arc::new(CachedParticipantResolver::new(harness.participants.clone(), 60_000)),
            Arc::new(CachedAccountResolver::new(harness.accounts.clone(), 60_000)),
        );
        (harness, flaky)
    }
}

pub(crate) fn pass_through() -> AggregateConfig {
    AggregateConfig { pass_through_mode: true, ..AggregateConfig::default() }
}

/// Aggregate whose repositories fail every call with `err`
pub(crate) fn failing_aggregate(err: StoreError) -> QuotingAggregate {
    let store = Arc::new(FailingStore { err });
    let participants = Arc::new(StubParticipantService::new());
    participants.insert(Participant::active(PAYER_FSP));
    participants.insert(Participant::active(PAYEE_FSP));

    QuotingAggregate::new(
        AggregateConfig::default(),
        store.clone(),
        store,
        Arc::new(CachedParticipantResolver::new(participants, 60_000)),
        Arc::new(CachedAccountResolver::new(Arc::new(StubAccountLookupService::new()), 60_000)),
    )
}

struct FailingStore {
    err: StoreError,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(match &self.err {
            StoreError::Connection(msg) => StoreError::Connection(msg.clone()),
            StoreError::Serialization(msg) => StoreError::Serialization(msg.clone()),
            other => StoreError::Database(other.to_string()),
        })
    }
}

#[async_trait]
impl QuoteRepository for FailingStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn add_quote(&self, _quote: Quote) -> Result<QuoteId, StoreError> {
        self.fail()
    }
    async fn add_quotes(&self, _quotes: Vec<Quote>) -> Result<Vec<QuoteId>, StoreError> {
        self.fail()
    }
    async fn update_quote(&self, _quote: Quote) -> Result<Quote, StoreError> {
        self.fail()
    }
    async fn update_quotes(&self, _quotes: Vec<Quote>) -> Result<(), StoreError> {
        self.fail()
    }
    async fn remove_quote(&self, _quote_id: &str) -> Result<(), StoreError> {
        self.fail()
    }
    async fn get_quote_by_id(&self, _quote_id: &str) -> Result<Option<Quote>, StoreError> {
        self.fail()
    }
    async fn get_quotes_by_bulk_quote_id(&self, _id: &str) -> Result<Vec<Quote>, StoreError> {
        self.fail()
    }
    async fn get_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        self.fail()
    }
    async fn search_quotes(
        &self,
        _criteria: &QuoteSearchCriteria,
        _page: PageRequest,
    ) -> Result<Page<Quote>, StoreError> {
        self.fail()
    }
    async fn get_search_keywords(&self) -> Result<SearchKeywords, StoreError> {
        self.fail()
    }
}

#[async_trait]
impl BulkQuoteRepository for FailingStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn add_bulk_quote(&self, _bulk: BulkQuote) -> Result<BulkQuoteId, StoreError> {
        self.fail()
    }
    async fn update_bulk_quote(&self, _bulk: BulkQuote) -> Result<BulkQuote, StoreError> {
        self.fail()
    }
    async fn remove_bulk_quote(&self, _id: &str) -> Result<(), StoreError> {
        self.fail()
    }
    async fn get_bulk_quote_by_id(&self, _id: &str) -> Result<Option<BulkQuote>, StoreError> {
        self.fail()
    }
    async fn get_bulk_quotes(&self) -> Result<Vec<BulkQuote>, StoreError> {
        self.fail()
    }
}

/// Memory store whose next batch insert of quotes or bulk insert can be failed
pub(crate) struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_add_quotes: AtomicBool,
    fail_add_bulk_quote: AtomicBool,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_add_quotes: AtomicBool::new(false),
            fail_add_bulk_quote: AtomicBool::new(false),
        }
    }

    pub fn fail_next_add_quotes(&self) {
        self.fail_add_quotes.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_add_bulk_quote(&self) {
        self.fail_add_bulk_quote.store(true, Ordering::SeqCst);
    }

    fn tripped(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("simulated write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteRepository for FlakyStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn add_quote(&self, quote: Quote) -> Result<QuoteId, StoreError> {
        self.inner.add_quote(quote).await
    }
    async fn add_quotes(&self, quotes: Vec<Quote>) -> Result<Vec<QuoteId>, StoreError> {
        Self::tripped(&self.fail_add_quotes)?;
        self.inner.add_quotes(quotes).await
    }
    async fn update_quote(&self, quote: Quote) -> Result<Quote, StoreError> {
        self.inner.update_quote(quote).await
    }
    async fn update_quotes(&self, quotes: Vec<Quote>) -> Result<(), StoreError> {
        self.inner.update_quotes(quotes).await
    }
    async fn remove_quote(&self, quote_id: &str) -> Result<(), StoreError> {
        self.inner.remove_quote(quote_id).await
    }
    async fn get_quote_by_id(&self, quote_id: &str) -> Result<Option<Quote>, StoreError> {
        self.inner.get_quote_by_id(quote_id).await
    }
    async fn get_quotes_by_bulk_quote_id(&self, id: &str) -> Result<Vec<Quote>, StoreError> {
        self.inner.get_quotes_by_bulk_quote_id(id).await
    }
    async fn get_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        QuoteRepository::get_quotes(self.inner.as_ref()).await
    }
    async fn search_quotes(
        &self,
        criteria: &QuoteSearchCriteria,
        page: PageRequest,
    ) -> Result<Page<Quote>, StoreError> {
        self.inner.search_quotes(criteria, page).await
    }
    async fn get_search_keywords(&self) -> Result<SearchKeywords, StoreError> {
        self.inner.get_search_keywords().await
    }
}

#[async_trait]
impl BulkQuoteRepository for FlakyStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn add_bulk_quote(&self, bulk: BulkQuote) -> Result<BulkQuoteId, StoreError> {
        Self::tripped(&self.fail_add_bulk_quote)?;
        self.inner.add_bulk_quote(bulk).await
    }
    async fn update_bulk_quote(&self, bulk: BulkQuote) -> Result<BulkQuote, StoreError> {
        self.inner.update_bulk_quote(bulk).await
    }
    async fn remove_bulk_quote(&self, id: &str) -> Result<(), StoreError> {
        self.inner.remove_bulk_quote(id).await
    }
    async fn get_bulk_quote_by_id(&self, id: &str) -> Result<Option<BulkQuote>, StoreError> {
        self.inner.get_bulk_quote_by_id(id).await
    }
    async fn get_bulk_quotes(&self) -> Result<Vec<BulkQuote>, StoreError> {
        self.inner.get_bulk_quotes().await
    }
}

// =============================================================================
// Headers and payloads
// =============================================================================

/// Header of a message sent by the payer FSP
pub(crate) fn header() -> FspiopOpaqueState {
    FspiopOpaqueState::new(PAYER_FSP, PAYEE_FSP)
}

/// Header of a message sent back by the payee FSP
pub(crate) fn response_header() -> FspiopOpaqueState {
    FspiopOpaqueState::new(PAYEE_FSP, PAYER_FSP)
}

fn usd(amount: Decimal) -> Money {
    Money::new(Currency::new("USD").expect("valid currency"), amount)
}

fn to_payload<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("payload serializes")
}

pub(crate) fn quote_request_payload(quote_id: &str) -> Value {
    to_payload(&QuoteRequestReceived {
        quote_id: quote_id.to_string(),
        transaction_id: format!("tx-{}", quote_id),
        transaction_request_id: None,
        payee: Party::new("MSISDN", "222").with_fsp(PAYEE_FSP),
        payer: Party::new("MSISDN", "111").with_fsp(PAYER_FSP),
        amount_type: AmountType::Send,
        amount: usd(dec!(100)),
        fees: None,
        transaction_type: TransactionType::transfer(),
        geo_code: None,
        note: None,
        expiration: None,
        extension_list: None,
    })
}

pub(crate) fn quote_request(quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    InboundMessage::command(names::QUOTE_REQUEST_RECEIVED, quote_request_payload(quote_id), header)
}

pub(crate) fn quote_response(quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    let payload = to_payload(&QuoteResponseReceived {
        quote_id: quote_id.to_string(),
        transfer_amount: usd(dec!(101)),
        expiration: Utc::now() + Duration::hours(1),
        ilp_packet: "ilp".to_string(),
        condition: "cond".to_string(),
        payee_receive_amount: Some(usd(dec!(100))),
        payee_fsp_fee: Some(usd(dec!(1))),
        payee_fsp_commission: None,
        geo_code: None,
        extension_list: None,
    });
    InboundMessage::command(names::QUOTE_RESPONSE_RECEIVED, payload, header)
}

pub(crate) fn quote_query(quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    InboundMessage::command(
        names::QUOTE_QUERY_RECEIVED,
        serde_json::json!({ "quoteId": quote_id }),
        header,
    )
}

pub(crate) fn quote_rejected(quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    let payload = to_payload(&QuoteRejected {
        quote_id: quote_id.to_string(),
        error_information: ErrorInformation::new("3200", "Payee rejected the quote"),
    });
    InboundMessage::command(names::QUOTE_REJECTED, payload, header)
}

fn individual_quote(quote_id: &str) -> IndividualQuoteRequest {
    IndividualQuoteRequest {
        quote_id: quote_id.to_string(),
        transaction_id: format!("tx-{}", quote_id),
        payee: Party::new("MSISDN", format!("p-{}", quote_id)).with_fsp(PAYEE_FSP),
        amount_type: AmountType::Send,
        amount: usd(dec!(10)),
        fees: None,
        transaction_type: TransactionType::transfer(),
        note: None,
        extension_list: None,
    }
}

pub(crate) fn bulk_request_payload(bulk_quote_id: &str, quote_ids: &[&str]) -> Value {
    to_payload(&BulkQuoteRequested {
        bulk_quote_id: bulk_quote_id.to_string(),
        payer: Party::new("MSISDN", "111").with_fsp(PAYER_FSP),
        geo_code: None,
        expiration: None,
        individual_quotes: quote_ids.iter().map(|id| individual_quote(id)).collect(),
        extension_list: None,
    })
}

pub(crate) fn bulk_request(
    bulk_quote_id: &str,
    quote_ids: &[&str],
    header: FspiopOpaqueState,
) -> InboundMessage {
    InboundMessage::command(
        names::BULK_QUOTE_REQUESTED,
        bulk_request_payload(bulk_quote_id, quote_ids),
        header,
    )
}

pub(crate) fn accepted_result(quote_id: &str) -> IndividualQuoteResult {
    IndividualQuoteResult {
        quote_id: quote_id.to_string(),
        payee: None,
        transfer_amount: Some(usd(dec!(11))),
        payee_receive_amount: Some(usd(dec!(10))),
        payee_fsp_fee: Some(usd(dec!(1))),
        payee_fsp_commission: None,
        ilp_packet: Some("ilp".to_string()),
        condition: Some("cond".to_string()),
        error_information: None,
        extension_list: None,
    }
}

pub(crate) fn rejected_result(quote_id: &str) -> IndividualQuoteResult {
    IndividualQuoteResult {
        error_information: Some(ErrorInformation::new("3200", "Payee rejected the quote")),
        transfer_amount: None,
        payee_receive_amount: None,
        payee_fsp_fee: None,
        ilp_packet: None,
        condition: None,
        ..accepted_result(quote_id)
    }
}

pub(crate) fn bulk_pending(
    bulk_quote_id: &str,
    results: Vec<IndividualQuoteResult>,
    header: FspiopOpaqueState,
) -> InboundMessage {
    let payload = to_payload(&BulkQuotePendingReceived {
        bulk_quote_id: bulk_quote_id.to_string(),
        individual_quote_results: results,
        expiration: None,
        extension_list: None,
    });
    InboundMessage::command(names::BULK_QUOTE_PENDING_RECEIVED, payload, header)
}

pub(crate) fn bulk_query(bulk_quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    InboundMessage::command(
        names::BULK_QUOTE_QUERY_RECEIVED,
        serde_json::json!({ "bulkQuoteId": bulk_quote_id }),
        header,
    )
}

pub(crate) fn bulk_rejected(bulk_quote_id: &str, header: FspiopOpaqueState) -> InboundMessage {
    let payload = serde_json::json!({
        "bulkQuoteId": bulk_quote_id,
        "errorInformation": { "errorCode": "3200", "errorDescription": "Payer cancelled" },
    });
    InboundMessage::command(names::BULK_QUOTE_REJECTED, payload, header)
}
