//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access; each check-and-write
//! happens under a single write lock, so concurrent adders of the same id
//! see exactly one success.

use crate::error::StoreError;
use crate::repository::{
    ensure_id, BulkQuoteRepository, Page, PageRequest, QuoteRepository, QuoteSearchCriteria,
    SearchKeywords, BULK_QUOTE_ENTITY, QUOTE_ENTITY,
};
use async_trait::async_trait;
use quoting_domain::{BulkQuote, BulkQuoteId, Merge, Quote, QuoteId};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Quotes = HashMap<QuoteId, Quote>;
type BulkQuotes = HashMap<BulkQuoteId, BulkQuote>;

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryStore {
    quotes: RwLock<Quotes>,
    bulk_quotes: RwLock<BulkQuotes>,
}

fn poisoned() -> StoreError {
    StoreError::Database("in-memory store lock poisoned".to_string())
}

fn oldest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, String)) {
    items.sort_by_key(key);
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of quotes
    pub fn quote_count(&self) -> usize {
        self.quotes.read().map(|q| q.len()).unwrap_or(0)
    }

    /// Get the number of bulk quotes
    pub fn bulk_quote_count(&self) -> usize {
        self.bulk_quotes.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        if let Ok(mut quotes) = self.quotes.write() {
            quotes.clear();
        }
        if let Ok(mut bulk_quotes) = self.bulk_quotes.write() {
            bulk_quotes.clear();
        }
    }

    fn read_quotes(&self) -> Result<RwLockReadGuard<'_, Quotes>, StoreError> {
        self.quotes.read().map_err(|_| poisoned())
    }

    fn write_quotes(&self) -> Result<RwLockWriteGuard<'_, Quotes>, StoreError> {
        self.quotes.write().map_err(|_| poisoned())
    }

    fn read_bulk_quotes(&self) -> Result<RwLockReadGuard<'_, BulkQuotes>, StoreError> {
        self.bulk_quotes.read().map_err(|_| poisoned())
    }

    fn write_bulk_quotes(&self) -> Result<RwLockWriteGuard<'_, BulkQuotes>, StoreError> {
        self.bulk_quotes.write().map_err(|_| poisoned())
    }

    fn sorted_quotes(&self, criteria: &QuoteSearchCriteria) -> Result<Vec<Quote>, StoreError> {
        let mut matched: Vec<Quote> =
            self.read_quotes()?.values().filter(|q| criteria.matches(q)).cloned().collect();
        oldest_first(&mut matched, |q| (q.created_at, q.quote_id.clone()));
        Ok(matched)
    }
}

// =============================================================================
// QuoteRepository
// =============================================================================

#[async_trait]
impl QuoteRepository for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn add_quote(&self, mut quote: Quote) -> Result<QuoteId, StoreError> {
        ensure_id(&mut quote.quote_id);
        let mut quotes = self.write_quotes()?;
        if quotes.contains_key(&quote.quote_id) {
            return Err(StoreError::duplicate(QUOTE_ENTITY, quote.quote_id));
        }
        let id = quote.quote_id.clone();
        quotes.insert(id.clone(), quote);
        Ok(id)
    }

    async fn add_quotes(&self, mut batch: Vec<Quote>) -> Result<Vec<QuoteId>, StoreError> {
        for quote in &mut batch {
            ensure_id(&mut quote.quote_id);
        }

        let mut quotes = self.write_quotes()?;
        let mut seen = HashSet::new();
        for quote in &batch {
            if quotes.contains_key(&quote.quote_id) || !seen.insert(quote.quote_id.as_str()) {
                return Err(StoreError::duplicate(QUOTE_ENTITY, quote.quote_id.clone()));
            }
        }

        let ids = batch.iter().map(|q| q.quote_id.clone()).collect();
        for quote in batch {
            quotes.insert(quote.quote_id.clone(), quote);
        }
        Ok(ids)
    }

    async fn update_quote(&self, quote: Quote) -> Result<Quote, StoreError> {
        let mut quotes = self.write_quotes()?;
        let stored = quotes
            .get_mut(&quote.quote_id)
            .ok_or_else(|| StoreError::not_found(QUOTE_ENTITY, quote.quote_id.clone()))?;
        stored.check_merge(&quote)?;
        stored.merge_from(quote);
        Ok(stored.clone())
    }

    async fn update_quotes(&self, batch: Vec<Quote>) -> Result<(), StoreError> {
        let mut quotes = self.write_quotes()?;
        for quote in &batch {
            let stored = quotes
                .get(&quote.quote_id)
                .ok_or_else(|| StoreError::not_found(QUOTE_ENTITY, quote.quote_id.clone()))?;
            stored.check_merge(quote)?;
        }
        for quote in batch {
            if let Some(stored) = quotes.get_mut(&quote.quote_id) {
                stored.merge_from(quote);
            }
        }
        Ok(())
    }

    async fn remove_quote(&self, quote_id: &str) -> Result<(), StoreError> {
        self.write_quotes()?
            .remove(quote_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(QUOTE_ENTITY, quote_id))
    }

    async fn get_quote_by_id(&self, quote_id: &str) -> Result<Option<Quote>, StoreError> {
        Ok(self.read_quotes()?.get(quote_id).cloned())
    }

    async fn get_quotes_by_bulk_quote_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Vec<Quote>, StoreError> {
        let criteria = QuoteSearchCriteria {
            bulk_quote_id: Some(bulk_quote_id.to_string()),
            ..Default::default()
        };
        self.sorted_quotes(&criteria)
    }

    async fn get_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        self.sorted_quotes(&QuoteSearchCriteria::default())
    }

    async fn search_quotes(
        &self,
        criteria: &QuoteSearchCriteria,
        page: PageRequest,
    ) -> Result<Page<Quote>, StoreError> {
        Ok(Page::slice(self.sorted_quotes(criteria)?, page))
    }

    async fn get_search_keywords(&self) -> Result<SearchKeywords, StoreError> {
        Ok(SearchKeywords::collect(self.read_quotes()?.values()))
    }
}

// =============================================================================
// BulkQuoteRepository
// =============================================================================

#[async_trait]
impl BulkQuoteRepository for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn add_bulk_quote(&self, mut bulk_quote: BulkQuote) -> Result<BulkQuoteId, StoreError> {
        ensure_id(&mut bulk_quote.bulk_quote_id);
        let mut bulk_quotes = self.write_bulk_quotes()?;
        if bulk_quotes.contains_key(&bulk_quote.bulk_quote_id) {
            return Err(StoreError::duplicate(BULK_QUOTE_ENTITY, bulk_quote.bulk_quote_id));
        }
        let id = bulk_quote.bulk_quote_id.clone();
        bulk_quotes.insert(id.clone(), bulk_quote);
        Ok(id)
    }

    async fn update_bulk_quote(&self, bulk_quote: BulkQuote) -> Result<BulkQuote, StoreError> {
        let mut bulk_quotes = self.write_bulk_quotes()?;
        let stored = bulk_quotes.get_mut(&bulk_quote.bulk_quote_id).ok_or_else(|| {
            StoreError::not_found(BULK_QUOTE_ENTITY, bulk_quote.bulk_quote_id.clone())
        })?;
        stored.check_merge(&bulk_quote)?;
        stored.merge_from(bulk_quote);
        Ok(stored.clone())
    }

    async fn remove_bulk_quote(&self, bulk_quote_id: &str) -> Result<(), StoreError> {
        self.write_bulk_quotes()?
            .remove(bulk_quote_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(BULK_QUOTE_ENTITY, bulk_quote_id))
    }

    async fn get_bulk_quote_by_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Option<BulkQuote>, StoreError> {
        Ok(self.read_bulk_quotes()?.get(bulk_quote_id).cloned())
    }

    async fn get_bulk_quotes(&self) -> Result<Vec<BulkQuote>, StoreError> {
        let mut all: Vec<BulkQuote> = self.read_bulk_quotes()?.values().cloned().collect();
        oldest_first(&mut all, |b| (b.created_at, b.bulk_quote_id.clone()));
        Ok(all)
    }
}

// =============================================================================
// Tests
// =============================================================================
