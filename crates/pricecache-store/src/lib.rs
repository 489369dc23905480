//! # pricecache-store
//!
//! DuckDB-backed document store used as the persistent price cache.
//!
//! Documents are addressed by `(owner_id, doc_key)` and carry a flat JSON
//! field map plus a client-assigned timestamp used for age checks. Writes
//! always merge onto the stored document: fields absent from a write are kept.
//!
//! ```rust,no_run
//! use pricecache_store::{DocumentStore, DocumentStoreConfig, FieldMap};
//! use serde_json::json;
//!
//! let store = DocumentStore::open(DocumentStoreConfig::file("/tmp/prices.duckdb"))?;
//!
//! let mut fields = FieldMap::new();
//! fields.insert("price".into(), json!(242.84));
//! store.merge("user-1", "TSLA", fields, 1_700_000_000_000)?;
//!
//! let document = store.fetch("user-1", "TSLA")?;
//! assert!(document.is_some());
//! # Ok::<(), pricecache_store::StoreError>(())
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `price_cache` | One row per owner and document key |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ::duckdb::{Connection, ToSql};
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub use duckdb::{DatabaseLocation, DuckDbConnectionManager, PooledConnection};

/// Flat field map stored per document.
pub type FieldMap = serde_json::Map<String, Value>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (creating the database directory).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Field map could not be encoded or decoded.
    #[error("document fields are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored document does not hold a JSON object.
    #[error("document '{doc_key}' for owner '{owner_id}' does not hold a JSON object")]
    MalformedDocument { owner_id: String, doc_key: String },

    /// The write timestamp could not be rendered.
    #[error("failed to format write timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Configuration for the document store.
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub location: DatabaseLocation,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl DocumentStoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            max_pool_size: 4,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            max_pool_size: 4,
        }
    }
}

/// A document as persisted in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub owner_id: String,
    pub doc_key: String,
    pub fields: FieldMap,
    /// Epoch milliseconds supplied by the writer.
    pub client_timestamp_ms: i64,
    /// RFC3339 UTC timestamp assigned by the store on every write.
    pub updated_at: String,
}

/// Per-owner document store with merge-on-write semantics.
#[derive(Clone)]
pub struct DocumentStore {
    manager: DuckDbConnectionManager,
    write_lock: Arc<Mutex<()>>,
}

impl DocumentStore {
    /// Open a store, creating the database file and schema if needed.
    pub fn open(config: DocumentStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.location.path().and_then(|path| path.parent()) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.location, config.max_pool_size)?;
        let store = Self {
            manager,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(DocumentStoreConfig::in_memory())
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Read one document.
    pub fn fetch(
        &self,
        owner_id: &str,
        doc_key: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let connection = self.manager.acquire()?;
        fetch_with(&connection, owner_id, doc_key)
    }

    /// Read several documents of one owner. Keys without a document are skipped.
    pub fn fetch_many(
        &self,
        owner_id: &str,
        doc_keys: &[String],
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut documents = Vec::with_capacity(doc_keys.len());
        for doc_key in doc_keys {
            if let Some(document) = fetch_with(&connection, owner_id, doc_key)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    /// Merge `fields` onto the document at `(owner_id, doc_key)`, creating it if absent.
    ///
    /// Existing fields not named in `fields` are preserved. The client timestamp
    /// and the store write timestamp are replaced on every write.
    ///
    /// # Panics
    /// Panics if the write lock is poisoned.
    pub fn merge(
        &self,
        owner_id: &str,
        doc_key: &str,
        fields: FieldMap,
        client_timestamp_ms: i64,
    ) -> Result<StoredDocument, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .expect("document store write lock poisoned");
        let connection = self.manager.acquire()?;

        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<StoredDocument, StoreError> {
            let mut merged = fetch_with(&connection, owner_id, doc_key)?
                .map(|document| document.fields)
                .unwrap_or_default();
            merge_fields(&mut merged, fields);

            let updated_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
            let encoded = serde_json::to_string(&merged)?;

            let params: [&dyn ToSql; 5] = [
                &owner_id,
                &doc_key,
                &encoded,
                &client_timestamp_ms,
                &updated_at,
            ];
            connection.execute(
                "INSERT OR REPLACE INTO price_cache \
                 (owner_id, doc_key, fields, client_timestamp_ms, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;

            Ok(StoredDocument {
                owner_id: owner_id.to_owned(),
                doc_key: doc_key.to_owned(),
                fields: merged,
                client_timestamp_ms,
                updated_at,
            })
        })();

        finalize_transaction(&connection, result)
    }

    /// Number of documents stored for an owner.
    pub fn count(&self, owner_id: &str) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM price_cache WHERE owner_id = ?",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Shallow field merge: incoming fields overwrite, everything else is kept.
pub fn merge_fields(existing: &mut FieldMap, incoming: FieldMap) {
    for (name, value) in incoming {
        existing.insert(name, value);
    }
}

fn fetch_with(
    connection: &Connection,
    owner_id: &str,
    doc_key: &str,
) -> Result<Option<StoredDocument>, StoreError> {
    let mut statement = connection.prepare(
        "SELECT fields, client_timestamp_ms, updated_at FROM price_cache \
         WHERE owner_id = ? AND doc_key = ?",
    )?;
    let params: [&dyn ToSql; 2] = [&owner_id, &doc_key];
    let mut rows = statement.query(params.as_slice())?;

    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let raw_fields: String = row.get(0)?;
    let client_timestamp_ms: i64 = row.get(1)?;
    let updated_at: String = row.get(2)?;

    let fields = match serde_json::from_str::<Value>(&raw_fields)? {
        Value::Object(fields) => fields,
        _ => {
            return Err(StoreError::MalformedDocument {
                owner_id: owner_id.to_owned(),
                doc_key: doc_key.to_owned(),
            })
        }
    };

    Ok(Some(StoredDocument {
        owner_id: owner_id.to_owned(),
        doc_key: doc_key.to_owned(),
        fields,
        client_timestamp_ms,
        updated_at,
    }))
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}
