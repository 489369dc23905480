//! Per-owner price cache.
//!
//! Documents are flat JSON field maps addressed by `(owner, key)`. Every write
//! is a merge: fields absent from the write survive, so raw price data and
//! derived analytics can accumulate without clobbering each other.
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryCacheStore`] | Process-local map behind a tokio `RwLock` |
//! | [`DuckDbCacheStore`] | Persistent store on top of `pricecache-store` |

mod duckdb;
mod memory;
mod policy;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{OwnerId, Symbol, TradingDate, UtcDateTime};

pub use self::duckdb::DuckDbCacheStore;
pub use memory::MemoryCacheStore;
pub use policy::{CachePolicy, Freshness};
pub use pricecache_store::FieldMap;

const TIMESTAMP_FIELD: &str = "timestamp";

/// Typed cache key. Each variant owns one record shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Latest price of a symbol, stored under the bare ticker.
    Quote(Symbol),
    /// One trading day of a symbol, stored under `SYMBOL-YYYY-MM-DD`.
    Daily { symbol: Symbol, date: TradingDate },
    /// Holding analytics snapshot, stored under `holding-SYMBOL`.
    Holding(Symbol),
}

impl CacheKey {
    pub fn document_id(&self) -> String {
        match self {
            Self::Quote(symbol) => symbol.as_str().to_owned(),
            Self::Daily { symbol, date } => format!("{symbol}-{date}"),
            Self::Holding(symbol) => format!("holding-{symbol}"),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.document_id())
    }
}

/// A cached document as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDocument {
    pub key: CacheKey,
    pub fields: FieldMap,
    /// Client-assigned epoch milliseconds used for age checks.
    pub timestamp_ms: i64,
    /// Store-assigned time of the last write.
    pub written_at: UtcDateTime,
}

impl CacheDocument {
    /// Decode the field map into a typed record. The client timestamp is
    /// exposed to the record as its `timestamp` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        let mut fields = self.fields.clone();
        fields.insert(
            String::from(TIMESTAMP_FIELD),
            Value::from(self.timestamp_ms),
        );
        serde_json::from_value(Value::Object(fields)).map_err(|error| CacheError::Malformed {
            key: self.key.document_id(),
            reason: error.to_string(),
        })
    }
}

/// Fields to merge onto a cache document plus the client timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub fields: FieldMap,
    pub timestamp_ms: i64,
}

impl CacheWrite {
    pub fn new(fields: FieldMap, timestamp_ms: i64) -> Self {
        Self {
            fields,
            timestamp_ms,
        }
    }

    /// Encode a serializable record as a flat field map.
    ///
    /// A `timestamp` field in the record is dropped; `timestamp_ms` is stored instead.
    pub fn from_record<T: Serialize>(record: &T, timestamp_ms: i64) -> Result<Self, CacheError> {
        match serde_json::to_value(record)? {
            Value::Object(mut fields) => {
                fields.remove(TIMESTAMP_FIELD);
                Ok(Self::new(fields, timestamp_ms))
            }
            _ => Err(CacheError::NotAnObject),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] pricecache_store::StoreError),

    #[error("cache backend task failed: {0}")]
    Backend(String),

    #[error("cache record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("cache records must encode as JSON objects")]
    NotAnObject,

    #[error("malformed cache document '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Per-owner, per-key document store with merge-on-write semantics.
pub trait CacheStore: Send + Sync {
    fn get<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CacheDocument>, CacheError>> + Send + 'a>>;

    /// Batched read. Keys without a document are absent from the map.
    fn get_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        keys: &'a [CacheKey],
    ) -> Pin<
        Box<dyn Future<Output = Result<HashMap<CacheKey, CacheDocument>, CacheError>> + Send + 'a>,
    >;

    /// Merge `write` onto the document at `key`, creating it if absent.
    fn merge_write<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
        write: CacheWrite,
    ) -> Pin<Box<dyn Future<Output = Result<CacheDocument, CacheError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceData;
    use serde_json::json;

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn document_ids_follow_key_shape() {
        let date = TradingDate::parse("2024-01-05").expect("valid date");

        assert_eq!(CacheKey::Quote(symbol("aapl")).document_id(), "AAPL");
        assert_eq!(
            CacheKey::Daily {
                symbol: symbol("AAPL"),
                date
            }
            .document_id(),
            "AAPL-2024-01-05"
        );
        assert_eq!(
            CacheKey::Holding(symbol("AAPL")).document_id(),
            "holding-AAPL"
        );
    }

    #[test]
    fn write_from_record_drops_timestamp_field() {
        let mut fields = FieldMap::new();
        fields.insert("symbol".into(), json!("TSLA"));
        fields.insert("price".into(), json!(242.84));
        fields.insert("timestamp".into(), json!(1));
        let data: PriceData =
            serde_json::from_value(Value::Object(fields)).expect("valid record");

        let write = CacheWrite::from_record(&data, 42).expect("encodes");

        assert_eq!(write.timestamp_ms, 42);
        assert!(!write.fields.contains_key("timestamp"));
        assert_eq!(write.fields.get("price"), Some(&json!(242.84)));
    }

    #[test]
    fn decode_exposes_client_timestamp() {
        let mut fields = FieldMap::new();
        fields.insert("symbol".into(), json!("TSLA"));
        fields.insert("price".into(), json!(242.84));
        let document = CacheDocument {
            key: CacheKey::Quote(symbol("TSLA")),
            fields,
            timestamp_ms: 1_700_000_000_000,
            written_at: UtcDateTime::now(),
        };

        let data: PriceData = document.decode().expect("decodes");
        assert_eq!(data.timestamp, 1_700_000_000_000);
        assert!(data.extra.is_empty());
    }

    #[test]
    fn decode_reports_malformed_document() {
        let document = CacheDocument {
            key: CacheKey::Quote(symbol("TSLA")),
            fields: FieldMap::new(),
            timestamp_ms: 0,
            written_at: UtcDateTime::now(),
        };

        let error = document.decode::<PriceData>().expect_err("price is required");
        assert!(matches!(error, CacheError::Malformed { key, .. } if key == "TSLA"));
    }

    #[test]
    fn scalar_records_are_rejected() {
        let error = CacheWrite::from_record(&5, 0).expect_err("not an object");
        assert!(matches!(error, CacheError::NotAnObject));
    }
}
