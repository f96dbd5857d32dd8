//! PostgreSQL document store.
//!
//! One JSONB document per record: `quotes` keyed by `quote_id`, `bulk_quotes`
//! keyed by `bulk_quote_id`. Inserts use `ON CONFLICT DO NOTHING`, so the
//! primary key settles races between concurrent adders of the same id.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{
    ensure_id, BulkQuoteRepository, Page, PageRequest, QuoteRepository, QuoteSearchCriteria,
    SearchKeywords, BULK_QUOTE_ENTITY, QUOTE_ENTITY,
};
use async_trait::async_trait;
use quoting_domain::{BulkQuote, BulkQuoteId, Merge, Quote, QuoteId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::sync::RwLock;
use tracing::info;

/// Maximum pool connections
const MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL-backed quote and bulk quote repositories.
///
/// The pool is acquired by `init()` and released by `destroy()`; a store built
/// with [`PgStore::from_pool`] is ready immediately.
pub struct PgStore {
    database_url: String,
    pool: RwLock<Option<PgPool>>,
}

impl PgStore {
    /// Create a store that connects to `database_url` on `init()`.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self { database_url: database_url.into(), pool: RwLock::new(None) }
    }

    /// Wrap an existing pool (schema must already be migrated).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { database_url: String::new(), pool: RwLock::new(Some(pool)) }
    }

    /// Clone the pool handle out of the lock. Never held across an await.
    fn pool(&self) -> Result<PgPool, StoreError> {
        self.pool
            .read()
            .map_err(|_| StoreError::Connection("pool lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| StoreError::Connection("store not initialized".to_string()))
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if self.pool().is_ok() {
            return Ok(());
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&self.database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {}", e)))?;

        let mut slot =
            self.pool.write().map_err(|_| StoreError::Connection("pool lock poisoned".into()))?;
        if slot.is_none() {
            *slot = Some(pool);
            info!("PostgreSQL store initialized");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        let pool = self
            .pool
            .write()
            .map_err(|_| StoreError::Connection("pool lock poisoned".into()))?
            .take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("PostgreSQL store closed");
        }
        Ok(())
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn duplicate_as<'a>(entity: &'static str, id: &'a str) -> impl Fn(sqlx::Error) -> StoreError + 'a {
    move |err| match StoreError::from(err) {
        StoreError::Duplicate { .. } => StoreError::duplicate(entity, id),
        other => other,
    }
}

async fn insert_quote(
    tx: &mut Transaction<'_, Postgres>,
    quote: &Quote,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO quotes (quote_id, bulk_quote_id, doc, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (quote_id) DO NOTHING
        "#,
    )
    .bind(&quote.quote_id)
    .bind(&quote.bulk_quote_id)
    .bind(Json(quote))
    .bind(quote.created_at)
    .bind(quote.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(duplicate_as(QUOTE_ENTITY, &quote.quote_id))?;

    Ok(result.rows_affected() == 1)
}

async fn merge_quote(
    tx: &mut Transaction<'_, Postgres>,
    quote: Quote,
) -> Result<Quote, StoreError> {
    let row = sqlx::query("SELECT doc FROM quotes WHERE quote_id = $1 FOR UPDATE")
        .bind(&quote.quote_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::not_found(QUOTE_ENTITY, quote.quote_id.clone()))?;

    let Json(mut stored): Json<Quote> = row.try_get("doc")?;
    stored.check_merge(&quote)?;
    stored.merge_from(quote);

    sqlx::query(
        "UPDATE quotes SET doc = $2, bulk_quote_id = $3, updated_at = $4 WHERE quote_id = $1",
    )
    .bind(&stored.quote_id)
    .bind(Json(&stored))
    .bind(&stored.bulk_quote_id)
    .bind(stored.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(stored)
}

/// Filter clause shared by the search and count queries; binds $1..$6.
const SEARCH_FILTER: &str = r#"
    ($1::text IS NULL OR doc->>'amountType' = $1)
    AND ($2::text IS NULL OR doc->'transactionType'->>'scenario' = $2)
    AND ($3::text IS NULL OR doc->>'requesterFspId' = $3)
    AND ($4::text IS NULL OR doc->>'destinationFspId' = $4)
    AND ($5::text IS NULL OR doc->>'status' = $5)
    AND ($6::text IS NULL OR bulk_quote_id = $6)
"#;

fn bind_criteria<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    criteria: &'q QuoteSearchCriteria,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(criteria.amount_type.map(|t| t.as_str()))
        .bind(criteria.transaction_type.as_deref())
        .bind(criteria.requester_fsp_id.as_deref())
        .bind(criteria.destination_fsp_id.as_deref())
        .bind(criteria.status.map(|s| s.as_str()))
        .bind(criteria.bulk_quote_id.as_deref())
}

fn decode_quotes(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Quote>, StoreError> {
    rows.iter()
        .map(|row| row.try_get::<Json<Quote>, _>("doc").map(|Json(q)| q).map_err(StoreError::from))
        .collect()
}

// =============================================================================
// QuoteRepository
// =============================================================================

#[async_trait]
impl QuoteRepository for PgStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.connect().await
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        self.disconnect().await
    }

    async fn add_quote(&self, mut quote: Quote) -> Result<QuoteId, StoreError> {
        ensure_id(&mut quote.quote_id);
        let mut tx = self.pool()?.begin().await?;
        if !insert_quote(&mut tx, &quote).await? {
            return Err(StoreError::duplicate(QUOTE_ENTITY, quote.quote_id));
        }
        tx.commit().await?;
        Ok(quote.quote_id)
    }

    async fn add_quotes(&self, mut quotes: Vec<Quote>) -> Result<Vec<QuoteId>, StoreError> {
        let mut tx = self.pool()?.begin().await?;
        let mut ids = Vec::with_capacity(quotes.len());
        for quote in &mut quotes {
            ensure_id(&mut quote.quote_id);
            if !insert_quote(&mut tx, quote).await? {
                // Dropping the transaction rolls back the earlier inserts
                return Err(StoreError::duplicate(QUOTE_ENTITY, quote.quote_id.clone()));
            }
            ids.push(quote.quote_id.clone());
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn update_quote(&self, quote: Quote) -> Result<Quote, StoreError> {
        let mut tx = self.pool()?.begin().await?;
        let merged = merge_quote(&mut tx, quote).await?;
        tx.commit().await?;
        Ok(merged)
    }

    async fn update_quotes(&self, quotes: Vec<Quote>) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        for quote in quotes {
            merge_quote(&mut tx, quote).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_quote(&self, quote_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM quotes WHERE quote_id = $1")
            .bind(quote_id)
            .execute(&self.pool()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(QUOTE_ENTITY, quote_id));
        }
        Ok(())
    }

    async fn get_quote_by_id(&self, quote_id: &str) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query("SELECT doc FROM quotes WHERE quote_id = $1")
            .bind(quote_id)
            .fetch_optional(&self.pool()?)
            .await?;
        row.map(|r| r.try_get::<Json<Quote>, _>("doc").map(|Json(q)| q))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn get_quotes_by_bulk_quote_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Vec<Quote>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM quotes WHERE bulk_quote_id = $1 ORDER BY created_at, quote_id",
        )
        .bind(bulk_quote_id)
        .fetch_all(&self.pool()?)
        .await?;
        decode_quotes(rows)
    }

    async fn get_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM quotes ORDER BY created_at, quote_id")
            .fetch_all(&self.pool()?)
            .await?;
        decode_quotes(rows)
    }

    async fn search_quotes(
        &self,
        criteria: &QuoteSearchCriteria,
        page: PageRequest,
    ) -> Result<Page<Quote>, StoreError> {
        let pool = self.pool()?;

        let count_sql = format!("SELECT COUNT(*) AS total FROM quotes WHERE {}", SEARCH_FILTER);
        let total: i64 =
            bind_criteria(sqlx::query(&count_sql), criteria).fetch_one(&pool).await?.try_get("total")?;

        let page_sql = format!(
            "SELECT doc FROM quotes WHERE {} ORDER BY created_at, quote_id LIMIT $7 OFFSET $8",
            SEARCH_FILTER
        );
        let rows = bind_criteria(sqlx::query(&page_sql), criteria)
            .bind(page.page_size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&pool)
            .await?;

        Ok(Page::new(decode_quotes(rows)?, page, total.max(0) as usize))
    }

    async fn get_search_keywords(&self) -> Result<SearchKeywords, StoreError> {
        // Keywords are derived from the documents so both stores agree on them
        Ok(SearchKeywords::collect(&self.get_quotes().await?))
    }
}

// =============================================================================
// BulkQuoteRepository
// =============================================================================

#[async_trait]
impl BulkQuoteRepository for PgStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.connect().await
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        self.disconnect().await
    }

    async fn add_bulk_quote(&self, mut bulk_quote: BulkQuote) -> Result<BulkQuoteId, StoreError> {
        ensure_id(&mut bulk_quote.bulk_quote_id);
        let id = bulk_quote.bulk_quote_id.clone();
        let result = sqlx::query(
            r#"
            INSERT INTO bulk_quotes (bulk_quote_id, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (bulk_quote_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(Json(&bulk_quote))
        .bind(bulk_quote.created_at)
        .bind(bulk_quote.updated_at)
        .execute(&self.pool()?)
        .await
        .map_err(duplicate_as(BULK_QUOTE_ENTITY, &id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate(BULK_QUOTE_ENTITY, id));
        }
        Ok(id)
    }

    async fn update_bulk_quote(&self, bulk_quote: BulkQuote) -> Result<BulkQuote, StoreError> {
        let mut tx = self.pool()?.begin().await?;
        let row = sqlx::query("SELECT doc FROM bulk_quotes WHERE bulk_quote_id = $1 FOR UPDATE")
            .bind(&bulk_quote.bulk_quote_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(BULK_QUOTE_ENTITY, bulk_quote.bulk_quote_id.clone())
            })?;

        let Json(mut stored): Json<BulkQuote> = row.try_get("doc")?;
        stored.check_merge(&bulk_quote)?;
        stored.merge_from(bulk_quote);

        sqlx::query("UPDATE bulk_quotes SET doc = $2, updated_at = $3 WHERE bulk_quote_id = $1")
            .bind(&stored.bulk_quote_id)
            .bind(Json(&stored))
            .bind(stored.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn remove_bulk_quote(&self, bulk_quote_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bulk_quotes WHERE bulk_quote_id = $1")
            .bind(bulk_quote_id)
            .execute(&self.pool()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(BULK_QUOTE_ENTITY, bulk_quote_id));
        }
        Ok(())
    }

    async fn get_bulk_quote_by_id(
        &self,
        bulk_quote_id: &str,
    ) -> Result<Option<BulkQuote>, StoreError> {
        let row = sqlx::query("SELECT doc FROM bulk_quotes WHERE bulk_quote_id = $1")
            .bind(bulk_quote_id)
            .fetch_optional(&self.pool()?)
            .await?;
        row.map(|r| r.try_get::<Json<BulkQuote>, _>("doc").map(|Json(b)| b))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn get_bulk_quotes(&self) -> Result<Vec<BulkQuote>, StoreError> {
        let rows =
            sqlx::query("SELECT doc FROM bulk_quotes ORDER BY created_at, bulk_quote_id")
                .fetch_all(&self.pool()?)
                .await?;
        rows.iter()
            .map(|row| {
                row.try_get::<Json<BulkQuote>, _>("doc").map(|Json(b)| b).map_err(StoreError::from)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quoting_domain::{AmountType, Currency, Money, Party, QuoteStatus, TransactionType};
    use rust_decimal_macros::dec;

    fn quote(id: &str) -> Quote {
        Quote::new(
            id,
            "tx1",
            "payerfsp",
            "payeefsp",
            Party::new("MSISDN", "111"),
            Party::new("MSISDN", "222"),
            AmountType::Send,
            Money::new(Currency::new("USD").unwrap(), dec!(10)),
            TransactionType::transfer(),
        )
    }

    /// Run with: `cargo test -p quoting-store --features postgres`
    #[sqlx::test(migrations = "../migrations")]
    async fn test_pg_duplicate_and_merge(pool: PgPool) {
        let store = PgStore::from_pool(pool);

        store.add_quote(quote("q1")).await.unwrap();
        let err = store.add_quote(quote("q1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        let mut patch = quote("q1");
        patch.status = Some(QuoteStatus::Accepted);
        let merged = store.update_quote(patch).await.unwrap();
        assert_eq!(merged.status, Some(QuoteStatus::Accepted));

        let err = store.update_quote(quote("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.get_quotes().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_pg_search_by_bulk_id(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let mut item = quote("q1");
        item.bulk_quote_id = Some("b1".to_string());
        store.add_quotes(vec![item, quote("q2")]).await.unwrap();

        let criteria =
            QuoteSearchCriteria { bulk_quote_id: Some("b1".to_string()), ..Default::default() };
        let page = store.search_quotes(&criteria, PageRequest::default()).await.unwrap();

        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].quote_id, "q1");
    }
}
