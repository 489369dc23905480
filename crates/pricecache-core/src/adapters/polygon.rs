use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::data_source::{MarketDataSource, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{DailyBar, Symbol, TradingDate, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Polygon.io aggregates adapter.
///
/// The API key travels as the `apiKey` query parameter.
#[derive(Clone)]
pub struct PolygonAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout_ms: u64,
}

impl PolygonAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn fetch_aggregates(&self, request: HttpRequest) -> Result<Vec<DailyBar>, SourceError> {
        debug!(url = %request.url, "polygon request");

        let request = request
            .with_query("adjusted", "true")
            .with_query("apiKey", self.api_key.as_str())
            .with_timeout_ms(self.timeout_ms);

        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.retryable() {
                SourceError::unavailable(format!("polygon transport error: {}", error.message()))
            } else {
                SourceError::internal(format!("polygon transport error: {}", error.message()))
            }
        })?;

        if response.is_success() {
            return parse_aggregates(&response.body);
        }

        Err(match response.status {
            429 => SourceError::rate_limited("polygon upstream returned status 429"),
            status @ (401 | 403) => SourceError::invalid_request(format!(
                "polygon rejected credentials with status {status}"
            )),
            status => {
                SourceError::unavailable(format!("polygon upstream returned status {status}"))
            }
        })
    }
}

impl MarketDataSource for PolygonAdapter {
    fn previous_close<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/v2/aggs/ticker/{}/prev", self.base_url, symbol);
            self.fetch_aggregates(HttpRequest::get(url)).await
        })
    }

    fn daily_range<'a>(
        &'a self,
        symbol: &'a Symbol,
        from: TradingDate,
        to: TradingDate,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DailyBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if from > to {
                return Err(SourceError::invalid_request(
                    ValidationError::InvertedDateRange {
                        from: from.format(),
                        to: to.format(),
                    }
                    .to_string(),
                ));
            }

            let url = format!(
                "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
                self.base_url, symbol, from, to
            );
            self.fetch_aggregates(HttpRequest::get(url).with_query("sort", "asc"))
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct PolygonAggsResponse {
    #[serde(default)]
    results: Option<Vec<PolygonAggregate>>,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregate {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
    t: i64,
}

fn parse_aggregates(body: &str) -> Result<Vec<DailyBar>, SourceError> {
    let response: PolygonAggsResponse = serde_json::from_str(body).map_err(|e| {
        SourceError::internal(format!("failed to parse polygon aggregates response: {e}"))
    })?;

    response
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            DailyBar::new(row.t, row.o, row.h, row.l, row.c, row.v)
                .map_err(|error| SourceError::internal(error.to_string()))
        })
        .collect()
}
