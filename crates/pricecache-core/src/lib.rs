//! Rate-limited, cache-first stock price lookups.
//!
//! This crate contains:
//! - Domain types for symbols, owners, trading dates and price records
//! - The Polygon aggregates adapter and its HTTP transport
//! - A FIFO request queue spacing upstream calls by a fixed delay
//! - Per-owner merge-on-write cache stores (in-memory and DuckDB)
//! - [`PriceService`], which decides between cache and upstream
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pricecache_core::{
//!     MemoryCacheStore, OwnerId, PolygonAdapter, PriceService, ReqwestHttpClient, Symbol,
//! };
//!
//! # async fn run() -> Result<(), pricecache_core::ValidationError> {
//! let source = PolygonAdapter::new(Arc::new(ReqwestHttpClient::new()), "demo");
//! let store = Arc::new(MemoryCacheStore::new());
//! let service = PriceService::builder(Arc::new(source), store).build();
//!
//! let owner = OwnerId::parse("user-1")?;
//! let result = service.get(&owner, &Symbol::parse("TSLA")?, false).await;
//! if let Some(data) = result.data {
//!     println!("{} {}", data.symbol, data.price);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cache;
pub mod clock;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod prices;
pub mod throttling;

pub use adapters::PolygonAdapter;
pub use cache::{
    CacheDocument, CacheError, CacheKey, CachePolicy, CacheStore, CacheWrite, DuckDbCacheStore,
    FieldMap, Freshness, MemoryCacheStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, PriceCacheConfig};
pub use data_source::{MarketDataSource, SourceError, SourceErrorKind};
pub use domain::{DailyBar, HoldingSnapshot, OwnerId, PriceData, Symbol, TradingDate, UtcDateTime};
pub use error::ValidationError;
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use prices::{
    BatchEntry, FetchResult, HistoryResult, HistorySeries, PriceBatch, PriceService,
    PriceServiceBuilder,
};
pub use pricecache_store::{DocumentStore, DocumentStoreConfig, StoreError};
pub use throttling::{QueueError, RequestQueue, ThrottleConfig};
