//! Quoting Storage Layer
//!
//! Provides persistence for quotes and bulk quotes.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use quoting_store::{MemoryStore, QuoteRepository};
//! use quoting_domain::{AmountType, Currency, Money, Party, Quote, TransactionType};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let quote = Quote::new(
//!         "",
//!         "tx-1",
//!         "payerfsp",
//!         "payeefsp",
//!         Party::new("MSISDN", "111"),
//!         Party::new("MSISDN", "222"),
//!         AmountType::Send,
//!         Money::new(Currency::new("USD").unwrap(), Decimal::TEN),
//!         TransactionType::transfer(),
//!     );
//!     let id = store.add_quote(quote).await.unwrap();
//!
//!     let stored = store.get_quote_by_id(&id).await.unwrap();
//!     assert!(stored.is_some());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{
    BulkQuoteRepository, Page, PageRequest, QuoteRepository, QuoteSearchCriteria,
    SearchKeywords, BULK_QUOTE_ENTITY, QUOTE_ENTITY,
};
