//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for quotes and bulk quotes.
//! Implementations can be PostgreSQL or in-memory for testing.
//!
//! Both repositories enforce id uniqueness on add and existence on update;
//! updates merge field by field (see [`quoting_domain::Merge`]).

use crate::error::StoreError;
use async_trait::async_trait;
use quoting_domain::{AmountType, BulkQuote, BulkQuoteId, Quote, QuoteId, QuoteStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Entity type labels used in errors
pub const QUOTE_ENTITY: &str = "quote";
pub const BULK_QUOTE_ENTITY: &str = "bulk_quote";

/// Replace an empty id with a fresh time-ordered one
pub(crate) fn ensure_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = Uuid::now_v7().to_string();
    }
}

// =============================================================================
// Search
// =============================================================================

/// Filters for [`QuoteRepository::search_quotes`]. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSearchCriteria {
    pub amount_type: Option<AmountType>,
    /// Transaction scenario (e.g., TRANSFER)
    pub transaction_type: Option<String>,
    pub requester_fsp_id: Option<String>,
    pub destination_fsp_id: Option<String>,
    pub status: Option<QuoteStatus>,
    pub bulk_quote_id: Option<BulkQuoteId>,
}

impl QuoteSearchCriteria {
    /// Whether `quote` satisfies every present filter
    pub fn matches(&self, quote: &Quote) -> bool {
        self.amount_type.map_or(true, |t| quote.amount_type == t)
            && self
                .transaction_type
                .as_ref()
                .map_or(true, |t| &quote.transaction_type.scenario == t)
            && self.requester_fsp_id.as_ref().map_or(true, |id| &quote.requester_fsp_id == id)
            && self.destination_fsp_id.as_ref().map_or(true, |id| &quote.destination_fsp_id == id)
            && self.status.map_or(true, |s| quote.status == Some(s))
            && self
                .bulk_quote_id
                .as_ref()
                .map_or(true, |id| quote.bulk_quote_id.as_ref() == Some(id))
    }
}

/// Page selector, zero-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Largest page a caller may ask for
    pub const MAX_PAGE_SIZE: usize = 1000;

    /// Create a page request, clamping the size to `1..=MAX_PAGE_SIZE`
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self { page_index, page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE) }
    }

    /// Number of items to skip
    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Build a page from its items and the total match count
    pub fn new(items: Vec<T>, request: PageRequest, total_items: usize) -> Self {
        Self {
            items,
            page_index: request.page_index,
            page_size: request.page_size,
            total_items,
            total_pages: total_items.div_ceil(request.page_size),
        }
    }

    /// Slice a fully materialized, already ordered result set
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all.into_iter().skip(request.offset()).take(request.page_size).collect();
        Self::new(items, request, total)
    }
}

/// Distinct values per searchable field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchKeywords {
    pub amount_types: Vec<String>,
    pub transaction_types: Vec<String>,
    pub statuses: Vec<String>,
    pub requester_fsp_ids: Vec<String>,
    pub destination_fsp_ids: Vec<String>,
}

impl SearchKeywords {
    /// Collect keywords from a set of quotes, sorted and deduplicated
    pub fn collect<'a>(quotes: impl IntoIterator<Item = &'a Quote>) -> Self {
        let mut amount_types = BTreeSet::new();
        let mut transaction_types = BTreeSet::new();
        let mut statuses = BTreeSet::new();
        let mut requesters = BTreeSet::new();
        let mut destinations = BTreeSet::new();

        for quote in quotes {
            amount_types.insert(quote.amount_type.as_str().to_string());
            transaction_types.insert(quote.transaction_type.scenario.clone());
            if let Some(status) = quote.status {
                statuses.insert(status.as_str().to_string());
            }
            requesters.insert(quote.requester_fsp_id.clone());
            destinations.insert(quote.destination_fsp_id.clone());
        }

        Self {
            amount_types: amount_types.into_iter().collect(),
            transaction_types: transaction_types.into_iter().collect(),
            statuses: statuses.into_iter().collect(),
            requester_fsp_ids: requesters.into_iter().collect(),
            destination_fsp_ids: destinations.into_iter().collect(),
        }
    }
}

// =============================================================================
// Repositories
// =============================================================================

/// Repository for Quote entities
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// Acquire connections / create schema
    async fn init(&self) -> Result<(), StoreError>;

    /// Release connections
    async fn destroy(&self) -> Result<(), StoreError>;

    /// Insert a new quote. Returns its id (generated if the quote had none).
    ///
    /// # Errors
    /// `StoreError::Duplicate` if a quote with the same id exists
    async fn add_quote(&self, quote: Quote) -> Result<QuoteId, StoreError>;

    /// Insert several quotes, all or nothing
    async fn add_quotes(&self, quotes: Vec<Quote>) -> Result<Vec<QuoteId>, StoreError>;

    /// Merge `quote` into the stored record and return the result.
    ///
    /// # Errors
    /// `StoreError::NotFound` if no quote has that id; nothing is written
    async fn update_quote(&self, quote: Quote) -> Result<Quote, StoreError>;

    /// Merge several quotes, all or nothing
    async fn update_quotes(&self, quotes: Vec<Quote>) -> Result<(), StoreError>;

    /// Delete exactly one quote
    async fn remove_quote(&self, quote_id: &str) -> Result<(), StoreError>;

    /// Find a quote by ID
    async fn get_quote_by_id(&self, quote_id: &str) -> Result<Option<Quote>, StoreError>;

    /// Find the quotes fanned out from a bulk quote, oldest first
    async fn get_quotes_by_bulk_quote_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Vec<Quote>, StoreError>;

    /// All quotes, oldest first
    async fn get_quotes(&self) -> Result<Vec<Quote>, StoreError>;

    /// Filtered, paginated search, oldest first
    async fn search_quotes(
        &self,
        criteria: &QuoteSearchCriteria,
        page: PageRequest,
    ) -> Result<Page<Quote>, StoreError>;

    /// Distinct values per searchable field
    async fn get_search_keywords(&self) -> Result<SearchKeywords, StoreError>;
}

/// Repository for BulkQuote entities
#[async_trait]
pub trait BulkQuoteRepository: Send + Sync {
    /// Acquire connections / create schema
    async fn init(&self) -> Result<(), StoreError>;

    /// Release connections
    async fn destroy(&self) -> Result<(), StoreError>;

    /// Insert a new bulk quote. Returns its id (generated if it had none).
    async fn add_bulk_quote(&self, bulk_quote: BulkQuote) -> Result<BulkQuoteId, StoreError>;

    /// Merge `bulk_quote` into the stored record and return the result
    async fn update_bulk_quote(&self, bulk_quote: BulkQuote) -> Result<BulkQuote, StoreError>;

    /// Delete exactly one bulk quote
    async fn remove_bulk_quote(&self, bulk_quote_id: &str) -> Result<(), StoreError>;

    /// Find a bulk quote by ID
    async fn get_bulk_quote_by_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Option<BulkQuote>, StoreError>;

    /// All bulk quotes, oldest first
    async fn get_bulk_quotes(&self) -> Result<Vec<BulkQuote>, StoreError>;
}
