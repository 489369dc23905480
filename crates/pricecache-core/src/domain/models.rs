use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Symbol, TradingDate, ValidationError};

/// One end-of-day OHLCV aggregate as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Window start in epoch milliseconds.
    pub timestamp: i64,
    pub date: TradingDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    pub fn new(
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative_finite("open", open)?;
        validate_non_negative_finite("high", high)?;
        validate_non_negative_finite("low", low)?;
        validate_non_negative_finite("close", close)?;
        validate_non_negative_finite("volume", volume)?;

        Ok(Self {
            timestamp,
            date: TradingDate::from_epoch_millis(timestamp)?,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Price record handed to callers, either fresh from upstream or read from cache.
///
/// Fields merged into the same cache document by other writers (for example
/// `avgPrice` or `gain`) are carried through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<TradingDate>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Epoch milliseconds at which the price was fetched.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriceData {
    pub fn from_bar(
        symbol: Symbol,
        date: Option<TradingDate>,
        bar: &DailyBar,
        fetched_at_ms: i64,
    ) -> Self {
        Self {
            symbol,
            date,
            price: bar.close,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            volume: Some(bar.volume),
            timestamp: fetched_at_ms,
            extra: Map::new(),
        }
    }
}

/// Derived analytics for one portfolio holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSnapshot {
    pub symbol: Symbol,
    pub price: f64,
    pub shares: f64,
    pub avg_price: f64,
    pub value: f64,
    pub gain: f64,
    pub gain_percent: f64,
}

impl HoldingSnapshot {
    /// Compute value and gain for `shares` bought at `avg_price`, marked at `price`.
    pub fn from_position(
        symbol: Symbol,
        shares: f64,
        avg_price: f64,
        price: f64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative_finite("shares", shares)?;
        validate_non_negative_finite("avg_price", avg_price)?;
        validate_non_negative_finite("price", price)?;

        let value = shares * price;
        let cost = shares * avg_price;
        let gain = value - cost;
        let gain_percent = if cost > 0.0 { gain / cost * 100.0 } else { 0.0 };

        Ok(Self {
            symbol,
            price,
            shares,
            avg_price,
            value,
            gain,
            gain_percent,
        })
    }
}

fn validate_non_negative_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
