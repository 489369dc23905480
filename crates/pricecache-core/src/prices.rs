//! Cache-first price fetching.
//!
//! [`PriceService`] answers price lookups from the per-owner cache when an
//! entry is young enough and otherwise fetches through the shared
//! [`RequestQueue`], merge-writing what it gets back. Public operations never
//! fail: upstream and cache errors are logged and folded into the returned
//! result objects.
//!
//! Age checks follow [`CachePolicy`]: an entry younger than `max_age` is
//! served, and flagged stale once it reaches `stale_after`. Historical entries
//! use the same `max_age` but never carry the stale flag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheDocument, CacheError, CacheKey, CachePolicy, CacheStore, CacheWrite, Freshness,
};
use crate::clock::{Clock, SystemClock};
use crate::data_source::{MarketDataSource, SourceError};
use crate::throttling::{QueueError, RequestQueue, ThrottleConfig};
use crate::{DailyBar, HoldingSnapshot, OwnerId, PriceData, Symbol, TradingDate, ValidationError};

/// Outcome of a single price lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PriceData>,
    pub from_cache: bool,
    /// Set on current-price cache hits only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    fn cached(data: PriceData, is_stale: Option<bool>, freshness: Freshness) -> Self {
        Self {
            success: true,
            data: Some(data),
            from_cache: true,
            is_stale,
            cache_age_minutes: Some(freshness.age_minutes()),
            error: None,
        }
    }

    fn fetched(data: PriceData) -> Self {
        Self {
            success: true,
            data: Some(data),
            from_cache: false,
            is_stale: None,
            cache_age_minutes: None,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            from_cache: false,
            is_stale: None,
            cache_age_minutes: None,
            error: Some(error.into()),
        }
    }
}

/// One symbol's entry in a [`PriceBatch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    #[serde(flatten)]
    pub data: PriceData,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_stale: Option<bool>,
}

/// Outcome of a batch lookup. Symbols that could not be priced are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBatch {
    pub success: bool,
    pub data: BTreeMap<Symbol, BatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySeries {
    pub symbol: Symbol,
    pub results: Vec<DailyBar>,
}

/// Outcome of a ranged history lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HistorySeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("No data available")]
    NoData,
}

struct CachedRecord<T> {
    record: T,
    freshness: Freshness,
}

pub struct PriceServiceBuilder {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn CacheStore>,
    throttle: ThrottleConfig,
    queue: Option<RequestQueue>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl PriceServiceBuilder {
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Share an existing queue, e.g. with other services hitting the same API.
    pub fn with_queue(mut self, queue: RequestQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// # Panics
    /// Panics outside a tokio runtime when no queue was supplied.
    pub fn build(self) -> PriceService {
        let queue = self
            .queue
            .unwrap_or_else(|| RequestQueue::new(self.throttle));

        PriceService {
            source: self.source,
            store: self.store,
            queue,
            policy: self.policy,
            clock: self.clock,
        }
    }
}

/// Rate-limited, cache-first price lookups for many owners.
#[derive(Clone)]
pub struct PriceService {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn CacheStore>,
    queue: RequestQueue,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl PriceService {
    pub fn builder(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn CacheStore>,
    ) -> PriceServiceBuilder {
        PriceServiceBuilder {
            source,
            store,
            throttle: ThrottleConfig::default(),
            queue: None,
            policy: CachePolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Latest price for `symbol`, from cache when possible.
    pub async fn get(&self, owner: &OwnerId, symbol: &Symbol, force_refresh: bool) -> FetchResult {
        let key = CacheKey::Quote(symbol.clone());

        if !force_refresh {
            if let Some(hit) = self.read_cached::<PriceData>(owner, &key).await {
                debug!(owner = %owner, key = %key, stale = hit.freshness.is_stale(), "serving cached price");
                let stale = hit.freshness.is_stale();
                return FetchResult::cached(hit.record, Some(stale), hit.freshness);
            }
        }

        self.fetch_current(owner, symbol).await
    }

    /// Prices for several symbols; only symbols without a usable cache entry
    /// are fetched.
    pub async fn get_many(
        &self,
        owner: &OwnerId,
        symbols: &[Symbol],
        force_refresh: bool,
    ) -> PriceBatch {
        let mut unique = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !unique.contains(symbol) {
                unique.push(symbol.clone());
            }
        }

        let mut data = BTreeMap::new();
        let mut missing = Vec::new();

        if force_refresh {
            missing = unique;
        } else {
            let keys = unique
                .iter()
                .cloned()
                .map(CacheKey::Quote)
                .collect::<Vec<_>>();
            let cached = match self.store.get_many(owner, &keys).await {
                Ok(cached) => cached,
                Err(error) => {
                    warn!(owner = %owner, error = %error, "batch cache read failed; fetching all symbols");
                    HashMap::new()
                }
            };

            for (symbol, key) in unique.into_iter().zip(&keys) {
                match cached
                    .get(key)
                    .and_then(|document| self.usable::<PriceData>(document))
                {
                    Some(hit) => {
                        let is_stale = Some(hit.freshness.is_stale());
                        data.insert(
                            symbol,
                            BatchEntry {
                                data: hit.record,
                                from_cache: true,
                                is_stale,
                            },
                        );
                    }
                    None => missing.push(symbol),
                }
            }
        }

        if !missing.is_empty() {
            info!(owner = %owner, count = missing.len(), "fetching uncached symbols");
        }

        let fetched = join_all(
            missing
                .iter()
                .map(|symbol| self.fetch_current(owner, symbol)),
        )
        .await;

        for (symbol, result) in missing.into_iter().zip(fetched) {
            if let (true, Some(record)) = (result.success, result.data) {
                data.insert(
                    symbol,
                    BatchEntry {
                        data: record,
                        from_cache: false,
                        is_stale: None,
                    },
                );
            }
        }

        PriceBatch {
            success: true,
            data,
        }
    }

    /// Closing price of `symbol` on `date`, cached under `SYMBOL-YYYY-MM-DD`.
    ///
    /// A date of today or later is answered from the current-price path, with
    /// the requested date stamped onto the returned record.
    pub async fn get_historical(
        &self,
        owner: &OwnerId,
        symbol: &Symbol,
        date: TradingDate,
        force_refresh: bool,
    ) -> FetchResult {
        if date >= self.clock.today() {
            debug!(symbol = %symbol, date = %date, "historical date not closed; using current price");
            let mut result = self.get(owner, symbol, force_refresh).await;
            if let Some(data) = result.data.as_mut() {
                data.date = Some(date);
            }
            return result;
        }

        let key = CacheKey::Daily {
            symbol: symbol.clone(),
            date,
        };

        if !force_refresh {
            if let Some(hit) = self.read_cached::<PriceData>(owner, &key).await {
                debug!(owner = %owner, key = %key, "serving cached historical price");
                return FetchResult::cached(hit.record, None, hit.freshness);
            }
        }

        info!(owner = %owner, symbol = %symbol, date = %date, "fetching historical price from upstream");
        let bar = self
            .fetch_bars(symbol, Some((date, date)))
            .await
            .and_then(|bars| bar_for_day(bars, date).ok_or(FetchError::NoData));

        match bar {
            Ok(bar) => {
                let now = self.clock.now_ms();
                let data = PriceData::from_bar(symbol.clone(), Some(date), &bar, now);
                self.write_record(owner, &key, &data, now).await;
                FetchResult::fetched(data)
            }
            Err(error) => {
                warn!(owner = %owner, symbol = %symbol, date = %date, error = %error, "historical price fetch failed");
                FetchResult::failed(error.to_string())
            }
        }
    }

    /// Daily bars between `from` and `to` in one upstream call. Every returned
    /// day is merge-written under its own `SYMBOL-YYYY-MM-DD` key.
    pub async fn get_history(
        &self,
        owner: &OwnerId,
        symbol: &Symbol,
        from: TradingDate,
        to: TradingDate,
    ) -> HistoryResult {
        if from > to {
            let error = ValidationError::InvertedDateRange {
                from: from.format(),
                to: to.format(),
            };
            warn!(symbol = %symbol, error = %error, "rejected history request");
            return HistoryResult::failed(error.to_string());
        }

        info!(owner = %owner, symbol = %symbol, from = %from, to = %to, "fetching price history from upstream");
        let bars = match self.fetch_bars(symbol, Some((from, to))).await {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => return HistoryResult::failed(FetchError::NoData.to_string()),
            Err(error) => {
                warn!(owner = %owner, symbol = %symbol, error = %error, "price history fetch failed");
                return HistoryResult::failed(error.to_string());
            }
        };

        let now = self.clock.now_ms();
        let written = join_all(bars.iter().map(|bar| async move {
            let key = CacheKey::Daily {
                symbol: symbol.clone(),
                date: bar.date,
            };
            let data = PriceData::from_bar(symbol.clone(), Some(bar.date), bar, now);
            self.write_record(owner, &key, &data, now).await
        }))
        .await
        .into_iter()
        .filter(|written| *written)
        .count();
        debug!(symbol = %symbol, written, total = bars.len(), "backfilled daily cache entries");

        HistoryResult {
            success: true,
            data: Some(HistorySeries {
                symbol: symbol.clone(),
                results: bars,
            }),
            error: None,
        }
    }

    /// Merge-write several current prices at once. Returns how many writes succeeded.
    pub async fn cache_prices(&self, owner: &OwnerId, entries: &[PriceData]) -> usize {
        let now = self.clock.now_ms();
        join_all(entries.iter().map(|entry| async move {
            let key = CacheKey::Quote(entry.symbol.clone());
            self.write_record(owner, &key, entry, now).await
        }))
        .await
        .into_iter()
        .filter(|written| *written)
        .count()
    }

    /// Store derived holding analytics under `holding-SYMBOL`.
    pub async fn cache_holding(
        &self,
        owner: &OwnerId,
        snapshot: &HoldingSnapshot,
    ) -> Result<(), CacheError> {
        let key = CacheKey::Holding(snapshot.symbol.clone());
        let write = CacheWrite::from_record(snapshot, self.clock.now_ms())?;
        self.store.merge_write(owner, &key, write).await?;
        debug!(owner = %owner, key = %key, "cached holding snapshot");
        Ok(())
    }

    /// Holding analytics for `symbol` if a usable snapshot is cached.
    pub async fn cached_holding(
        &self,
        owner: &OwnerId,
        symbol: &Symbol,
    ) -> Option<HoldingSnapshot> {
        let key = CacheKey::Holding(symbol.clone());
        self.read_cached::<HoldingSnapshot>(owner, &key)
            .await
            .map(|hit| hit.record)
    }

    async fn fetch_current(&self, owner: &OwnerId, symbol: &Symbol) -> FetchResult {
        info!(owner = %owner, symbol = %symbol, "fetching current price from upstream");
        let bar = self
            .fetch_bars(symbol, None)
            .await
            .and_then(|bars| latest_bar(bars).ok_or(FetchError::NoData));

        match bar {
            Ok(bar) => {
                let now = self.clock.now_ms();
                let data = PriceData::from_bar(symbol.clone(), None, &bar, now);
                self.write_record(owner, &CacheKey::Quote(symbol.clone()), &data, now)
                    .await;
                FetchResult::fetched(data)
            }
            Err(error) => {
                warn!(owner = %owner, symbol = %symbol, error = %error, "current price fetch failed");
                FetchResult::failed(error.to_string())
            }
        }
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: Option<(TradingDate, TradingDate)>,
    ) -> Result<Vec<DailyBar>, FetchError> {
        let source = Arc::clone(&self.source);
        let symbol = symbol.clone();

        let bars = self
            .queue
            .enqueue(move || async move {
                match range {
                    None => source.previous_close(&symbol).await,
                    Some((from, to)) => source.daily_range(&symbol, from, to).await,
                }
            })
            .await??;

        Ok(bars)
    }

    async fn read_cached<T: DeserializeOwned>(
        &self,
        owner: &OwnerId,
        key: &CacheKey,
    ) -> Option<CachedRecord<T>> {
        match self.store.get(owner, key).await {
            Ok(Some(document)) => self.usable(&document),
            Ok(None) => None,
            Err(error) => {
                warn!(owner = %owner, key = %key, error = %error, "cache read failed; treating as miss");
                None
            }
        }
    }

    fn usable<T: DeserializeOwned>(&self, document: &CacheDocument) -> Option<CachedRecord<T>> {
        let freshness = self
            .policy
            .classify(document.timestamp_ms, self.clock.now_ms());
        if !freshness.is_usable() {
            debug!(key = %document.key, age_secs = freshness.age().as_secs(), "cached entry expired");
            return None;
        }

        match document.decode::<T>() {
            Ok(record) => Some(CachedRecord { record, freshness }),
            Err(error) => {
                warn!(key = %document.key, error = %error, "ignoring undecodable cache entry");
                None
            }
        }
    }

    async fn write_record<T: Serialize>(
        &self,
        owner: &OwnerId,
        key: &CacheKey,
        record: &T,
        timestamp_ms: i64,
    ) -> bool {
        let write = match CacheWrite::from_record(record, timestamp_ms) {
            Ok(write) => write,
            Err(error) => {
                warn!(key = %key, error = %error, "cache record encoding failed");
                return false;
            }
        };

        match self.store.merge_write(owner, key, write).await {
            Ok(_) => true,
            Err(error) => {
                warn!(owner = %owner, key = %key, error = %error, "cache write failed; continuing");
                false
            }
        }
    }
}

fn latest_bar(bars: Vec<DailyBar>) -> Option<DailyBar> {
    bars.into_iter().max_by_key(|bar| bar.timestamp)
}

fn bar_for_day(mut bars: Vec<DailyBar>, date: TradingDate) -> Option<DailyBar> {
    match bars.iter().position(|bar| bar.date == date) {
        Some(index) => Some(bars.swap_remove(index)),
        None => bars.into_iter().next(),
    }
}
