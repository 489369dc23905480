//! Shared fakes for the behavior tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pricecache_core::{
    CacheDocument, CacheError, CacheKey, CacheStore, CacheWrite, DailyBar, HttpClient, HttpError,
    HttpRequest, HttpResponse, ManualClock, MarketDataSource, MemoryCacheStore, OwnerId,
    PriceService, SourceError, Symbol, ThrottleConfig, TradingDate,
};

/// 2024-03-15T15:00:00Z
pub const NOW_MS: i64 = 1_710_514_800_000;
/// 2024-03-14T04:00:00Z, window start of the previous session's daily bar.
pub const PREV_SESSION_MS: i64 = 1_710_388_800_000;
pub const MINUTE_MS: i64 = 60_000;

pub fn owner(value: &str) -> OwnerId {
    OwnerId::parse(value).expect("valid owner")
}

pub fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

pub fn date(value: &str) -> TradingDate {
    TradingDate::parse(value).expect("valid date")
}

pub fn daily_bar(day: &str, close: f64) -> DailyBar {
    let midnight = date(day)
        .into_inner()
        .midnight()
        .assume_utc()
        .unix_timestamp();
    DailyBar::new(
        midnight * 1_000 + 4 * 60 * MINUTE_MS,
        close - 1.0,
        close + 2.0,
        close - 2.0,
        close,
        1_000_000.0,
    )
    .expect("valid bar")
}

// =============================================================================
// Scripted market data source
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    PreviousClose(Symbol),
    DailyRange {
        symbol: Symbol,
        from: TradingDate,
        to: TradingDate,
    },
}

#[derive(Debug, Clone)]
enum Script {
    Bars(Vec<DailyBar>),
    Fail(SourceError),
    Panic,
}

/// Market data source answering from per-symbol scripts and recording every call.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    previous: HashMap<Symbol, Script>,
    daily: HashMap<Symbol, Script>,
    calls: Mutex<Vec<(SourceCall, Instant)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_close(mut self, ticker: &str, close: f64) -> Self {
        let bar = DailyBar::new(
            PREV_SESSION_MS,
            close - 1.0,
            close + 2.0,
            close - 2.0,
            close,
            5_000_000.0,
        )
        .expect("valid bar");
        self.previous.insert(symbol(ticker), Script::Bars(vec![bar]));
        self
    }

    pub fn with_empty_close(mut self, ticker: &str) -> Self {
        self.previous.insert(symbol(ticker), Script::Bars(Vec::new()));
        self
    }

    pub fn with_close_failure(mut self, ticker: &str, error: SourceError) -> Self {
        self.previous.insert(symbol(ticker), Script::Fail(error));
        self
    }

    pub fn with_close_panic(mut self, ticker: &str) -> Self {
        self.previous.insert(symbol(ticker), Script::Panic);
        self
    }

    pub fn with_daily(mut self, ticker: &str, bars: Vec<DailyBar>) -> Self {
        self.daily.insert(symbol(ticker), Script::Bars(bars));
        self
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls
            .lock()
            .expect("call log lock")
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// When each upstream call started, in call order.
    pub fn call_starts(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .expect("call log lock")
            .iter()
            .map(|(_, started)| *started)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log lock").len()
    }

    pub fn range_call_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SourceCall::DailyRange { .. }))
            .count()
    }

    fn record(&self, call: SourceCall) {
        self.calls
            .lock()
            .expect("call log lock")
            .push((call, Instant::now()));
    }
}

fn play(
    script: Option<&Script>,
    keep: impl Fn(&DailyBar) -> bool,
) -> Result<Vec<DailyBar>, SourceError> {
    match script {
        None => Ok(Vec::new()),
        Some(Script::Bars(bars)) => Ok(bars.iter().filter(|bar| keep(bar)).cloned().collect()),
        Some(Script::Fail(error)) => Err(error.clone()),
        Some(Script::Panic) => panic!("scripted source panic"),
    }
}

impl MarketDataSource for ScriptedSource {
    fn previous_close<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.record(SourceCall::PreviousClose(symbol.clone()));
            play(self.previous.get(symbol), |_| true)
        })
    }

    fn daily_range<'a>(
        &'a self,
        symbol: &'a Symbol,
        from: TradingDate,
        to: TradingDate,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.record(SourceCall::DailyRange {
                symbol: symbol.clone(),
                from,
                to,
            });
            play(self.daily.get(symbol), |bar| bar.date >= from && bar.date <= to)
        })
    }
}

// =============================================================================
// Canned HTTP transport
// =============================================================================

/// HTTP client returning a fixed response per URL path and recording requests.
#[derive(Debug, Default)]
pub struct CannedHttpClient {
    responses: HashMap<String, HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, response: HttpResponse) -> Self {
        self.responses.insert(url.to_owned(), response);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("request log lock").clone()
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self
            .responses
            .get(&request.url)
            .cloned()
            .ok_or_else(|| HttpError::new(format!("no canned response for {}", request.url)));
        self.requests.lock().expect("request log lock").push(request);
        Box::pin(async move { response })
    }
}

pub fn polygon_prev_body(ticker: &str, close: f64) -> String {
    format!(
        r#"{{"ticker":"{ticker}","status":"OK","queryCount":1,"resultsCount":1,"adjusted":true,
"results":[{{"T":"{ticker}","v":98562311,"vw":241.9,"o":238.45,"c":{close},"h":244.1,"l":237.3,"t":{PREV_SESSION_MS},"n":1203455}}]}}"#
    )
}

// =============================================================================
// Cache store wrappers
// =============================================================================

/// In-memory store that counts reads and merge-writes.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryCacheStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CacheStore for CountingStore {
    fn get<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CacheDocument>, CacheError>> + Send + 'a>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(owner, key)
    }

    fn get_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        keys: &'a [CacheKey],
    ) -> Pin<
        Box<dyn Future<Output = Result<HashMap<CacheKey, CacheDocument>, CacheError>> + Send + 'a>,
    > {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_many(owner, keys)
    }

    fn merge_write<'a>(
        &'a self,
        owner: &'a OwnerId,
        key: &'a CacheKey,
        write: CacheWrite,
    ) -> Pin<Box<dyn Future<Output = Result<CacheDocument, CacheError>> + Send + 'a>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.merge_write(owner, key, write)
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> CacheError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        CacheError::Backend(String::from("cache backend offline"))
    }
}

impl CacheStore for FailingStore {
    fn get<'a>(
        &'a self,
        _owner: &'a OwnerId,
        _key: &'a CacheKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CacheDocument>, CacheError>> + Send + 'a>> {
        let error = self.fail();
        Box::pin(async move { Err(error) })
    }

    fn get_many<'a>(
        &'a self,
        _owner: &'a OwnerId,
        _keys: &'a [CacheKey],
    ) -> Pin<
        Box<dyn Future<Output = Result<HashMap<CacheKey, CacheDocument>, CacheError>> + Send + 'a>,
    > {
        let error = self.fail();
        Box::pin(async move { Err(error) })
    }

    fn merge_write<'a>(
        &'a self,
        _owner: &'a OwnerId,
        _key: &'a CacheKey,
        _write: CacheWrite,
    ) -> Pin<Box<dyn Future<Output = Result<CacheDocument, CacheError>> + Send + 'a>> {
        let error = self.fail();
        Box::pin(async move { Err(error) })
    }
}

// =============================================================================
// Service wiring
// =============================================================================

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW_MS))
}

/// Price service with no request spacing, so tests run at full speed.
pub fn unthrottled_service(
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn CacheStore>,
    clock: Arc<ManualClock>,
) -> PriceService {
    PriceService::builder(source, store)
        .with_throttle(ThrottleConfig::new(Duration::ZERO))
        .with_clock(clock)
        .build()
}
