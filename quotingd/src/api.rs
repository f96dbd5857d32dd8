//! Read-only admin HTTP API.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Quote search and lookup
//! - Bulk quote listing and lookup
//! - Search keywords (distinct values per searchable field)

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use quoting_domain::{AmountType, BulkQuote, Quote, QuoteStatus};
use quoting_store::{
    BulkQuoteRepository, Page, PageRequest, QuoteRepository, QuoteSearchCriteria,
    SearchKeywords, StoreError,
};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub quotes: Arc<dyn QuoteRepository>,
    pub bulk_quotes: Arc<dyn BulkQuoteRepository>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Query string of `GET /quotes`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSearchParams {
    pub amount_type: Option<AmountType>,
    pub transaction_type: Option<String>,
    pub requester_fsp_id: Option<String>,
    pub destination_fsp_id: Option<String>,
    pub status: Option<QuoteStatus>,
    pub bulk_quote_id: Option<String>,
    pub page_index: Option<usize>,
    pub page_size: Option<usize>,
}

impl QuoteSearchParams {
    fn into_parts(self) -> (QuoteSearchCriteria, PageRequest) {
        let defaults = PageRequest::default();
        let page = PageRequest::new(
            self.page_index.unwrap_or(defaults.page_index),
            self.page_size.unwrap_or(defaults.page_size),
        );
        let criteria = QuoteSearchCriteria {
            amount_type: self.amount_type,
            transaction_type: self.transaction_type,
            requester_fsp_id: self.requester_fsp_id,
            destination_fsp_id: self.destination_fsp_id,
            status: self.status,
            bulk_quote_id: self.bulk_quote_id,
        };
        (criteria, page)
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub msg: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { status: "error".to_string(), msg: msg.into() }))
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { .. } => error_response(StatusCode::NOT_FOUND, e.to_string()),
        other => {
            error!(error = %other, "Admin API store failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        },
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/quotes", get(search_quotes_handler))
        .route("/quotes/:id", get(get_quote_handler))
        .route("/bulk-quotes", get(list_bulk_quotes_handler))
        .route("/bulk-quotes/:id", get(get_bulk_quote_handler))
        .route("/searchKeywords", get(search_keywords_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Paginated keyword search.
async fn search_quotes_handler(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<QuoteSearchParams>, QueryRejection>,
) -> Result<Json<Page<Quote>>, ApiError> {
    let Query(params) = params
        .map_err(|e| error_response(StatusCode::UNPROCESSABLE_ENTITY, e.body_text()))?;
    let (criteria, page) = params.into_parts();

    let result = state.quotes.search_quotes(&criteria, page).await.map_err(store_error)?;
    Ok(Json(result))
}

async fn get_quote_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    state
        .quotes
        .get_quote_by_id(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("Quote not found: {}", id)))
}

async fn list_bulk_quotes_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<BulkQuote>>, ApiError> {
    let bulks = state.bulk_quotes.get_bulk_quotes().await.map_err(store_error)?;
    Ok(Json(bulks))
}

async fn get_bulk_quote_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<BulkQuote>, ApiError> {
    state
        .bulk_quotes
        .get_bulk_quote_by_id(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("Bulk quote not found: {}", id))
        })
}

async fn search_keywords_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SearchKeywords>, ApiError> {
    let keywords = state.quotes.get_search_keywords().await.map_err(store_error)?;
    Ok(Json(keywords))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use quoting_domain::{BulkQuote, Currency, Money, Party, TransactionType};
    use quoting_store::MemoryStore;
    use rust_decimal_macros::dec;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn quote(id: &str, amount_type: AmountType, status: QuoteStatus) -> Quote {
        let mut quote = Quote::new(
            id,
            format!("tx-{}", id),
            "payerfsp",
            "payeefsp",
            Party::new("MSISDN", "111"),
            Party::new("MSISDN", "222"),
            amount_type,
            Money::new(Currency::new("USD").unwrap(), dec!(10)),
            TransactionType::transfer(),
        );
        quote.status = Some(status);
        quote
    }

    async fn create_test_app() -> Router {
        let store = Arc::new(MemoryStore::new());
        store.add_quote(quote("q1", AmountType::Send, QuoteStatus::Received)).await.unwrap();
        store.add_quote(quote("q2", AmountType::Receive, QuoteStatus::Accepted)).await.unwrap();
        store.add_quote(quote("q3", AmountType::Send, QuoteStatus::Accepted)).await.unwrap();
        store
            .add_bulk_quote(BulkQuote::new("b1", Party::new("MSISDN", "111")))
            .await
            .unwrap();

        create_router(Arc::new(ApiState { quotes: store.clone(), bulk_quotes: store }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::body::Bytes) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = get(create_test_app().await, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = parse(&body);
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_search_quotes_filters_and_paginates() {
        let app = create_test_app().await;

        let (status, body) = get(app.clone(), "/quotes?amountType=SEND").await;
        assert_eq!(status, StatusCode::OK);
        let page: Page<Quote> = parse(&body);
        assert_eq!(page.total_items, 2);

        let (_, body) = get(app, "/quotes?status=ACCEPTED&pageIndex=1&pageSize=1").await;
        let page: Page<Quote> = parse(&body);
        assert_eq!(page.total_items, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_query_is_unprocessable() {
        let (status, body) = get(create_test_app().await, "/quotes?status=SOMETIMES").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorResponse = parse(&body);
        assert_eq!(error.status, "error");
    }

    #[tokio::test]
    async fn test_get_quote() {
        let app = create_test_app().await;

        let (status, body) = get(app.clone(), "/quotes/q2").await;
        assert_eq!(status, StatusCode::OK);
        let quote: Quote = parse(&body);
        assert_eq!(quote.quote_id, "q2");

        let (status, body) = get(app, "/quotes/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorResponse = parse(&body);
        assert!(error.msg.contains("missing"));
    }

    #[tokio::test]
    async fn test_bulk_quotes() {
        let app = create_test_app().await;

        let (status, body) = get(app.clone(), "/bulk-quotes").await;
        assert_eq!(status, StatusCode::OK);
        let bulks: Vec<BulkQuote> = parse(&body);
        assert_eq!(bulks.len(), 1);

        let (status, _) = get(app.clone(), "/bulk-quotes/b1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get(app, "/bulk-quotes/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_keywords() {
        let (status, body) = get(create_test_app().await, "/searchKeywords").await;

        assert_eq!(status, StatusCode::OK);
        let keywords: SearchKeywords = parse(&body);
        assert_eq!(keywords.amount_types, vec!["RECEIVE", "SEND"]);
        assert_eq!(keywords.statuses, vec!["ACCEPTED", "RECEIVED"]);
    }
}
