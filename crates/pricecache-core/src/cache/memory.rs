use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pricecache_store::merge_fields;
use tokio::sync::RwLock;

use super::{CacheDocument, CacheError, CacheKey, CacheStore, CacheWrite, FieldMap};
use crate::{OwnerId, UtcDateTime};

#[derive(Debug, Clone)]
struct MemoryEntry {
    fields: FieldMap,
    timestamp_ms: i64,
    written_at: UtcDateTime,
}

/// Thread-safe in-memory cache store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<HashMap<(OwnerId, CacheKey), MemoryEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

fn to_document(key: &CacheKey, entry: &MemoryEntry) -> CacheDocument {
    CacheDocument {
        key: key.clone(),
        fields: entry.fields.clone(),
        timestamp_ms: entry.timestamp_ms,
        written_at: entry.written_at,
    }
}

impl CacheStore for MemoryCacheStore {
    fn get<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CacheDocument>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let map = self.inner.read().await;
            Ok(map
                .get(&(owner.clone(), key.clone()))
                .map(|entry| to_document(key, entry)))
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
            let map = self.inner.read().await;
            Ok(keys
                .iter()
                .filter_map(|key| {
                    map.get(&(owner.clone(), key.clone()))
                        .map(|entry| (key.clone(), to_document(key, entry)))
                })
                .collect())
        })
    }

    fn merge_write<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
        write: CacheWrite,
    ) -> Pin<Box<dyn Future<Output = Result<CacheDocument, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let mut map = self.inner.write().await;
            let entry = map
                .entry((owner.clone(), key.clone()))
                .or_insert_with(|| MemoryEntry {
                    fields: FieldMap::new(),
                    timestamp_ms: write.timestamp_ms,
                    written_at: UtcDateTime::now(),
                });

            merge_fields(&mut entry.fields, write.fields);
            entry.timestamp_ms = write.timestamp_ms;
            entry.written_at = UtcDateTime::now();

            Ok(to_document(key, entry))
        })
    }
}
