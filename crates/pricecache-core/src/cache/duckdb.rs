use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use pricecache_store::{DocumentStore, StoredDocument};

use super::{CacheDocument, CacheError, CacheKey, CacheStore, CacheWrite};
use crate::{OwnerId, UtcDateTime};

/// Persistent cache store backed by the DuckDB document store.
///
/// DuckDB calls block, so each operation runs on tokio's blocking pool.
#[derive(Clone)]
pub struct DuckDbCacheStore {
    store: DocumentStore,
}

impl DuckDbCacheStore {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(DocumentStore) -> Result<T, CacheError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || operation(store))
            .await
            .map_err(|error| CacheError::Backend(error.to_string()))?
    }
}

fn to_document(key: CacheKey, stored: StoredDocument) -> Result<CacheDocument, CacheError> {
    let written_at =
        UtcDateTime::parse(&stored.updated_at).map_err(|error| CacheError::Malformed {
            key: stored.doc_key.clone(),
            reason: error.to_string(),
        })?;

    Ok(CacheDocument {
        key,
        fields: stored.fields,
        timestamp_ms: stored.client_timestamp_ms,
        written_at,
    })
}

impl CacheStore for DuckDbCacheStore {
    fn get<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CacheDocument>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let owner_id = owner.as_str().to_owned();
            let doc_key = key.document_id();
            let stored = self
                .blocking(move |store| Ok(store.fetch(&owner_id, &doc_key)?))
                .await?;

            stored
                .map(|stored| to_document(key.clone(), stored))
                .transpose()
        })
    }

    fn get_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        keys: &'a [CacheKey],
    ) -> Pin<
        Box<dyn Future<Output = Result<HashMap<CacheKey, CacheDocument>, CacheError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let by_id = keys
                .iter()
                .map(|key| (key.document_id(), key.clone()))
                .collect::<HashMap<_, _>>();
            let owner_id = owner.as_str().to_owned();
            let doc_keys = by_id.keys().cloned().collect::<Vec<_>>();

            let stored = self
                .blocking(move |store| Ok(store.fetch_many(&owner_id, &doc_keys)?))
                .await?;

            let mut documents = HashMap::with_capacity(stored.len());
            for document in stored {
                if let Some(key) = by_id.get(&document.doc_key) {
                    documents.insert(key.clone(), to_document(key.clone(), document)?);
                }
            }
            Ok(documents)
        })
    }

    fn merge_write<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
        write: CacheWrite,
    ) -> Pin<Box<dyn Future<Output = Result<CacheDocument, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let owner_id = owner.as_str().to_owned();
            let doc_key = key.document_id();
            let stored = self
                .blocking(move |store| {
                    Ok(store.merge(&owner_id, &doc_key, write.fields, write.timestamp_ms)?)
                })
                .await?;

            to_document(key.clone(), stored)
        })
    }
}
