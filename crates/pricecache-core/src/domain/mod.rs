//! Domain types shared by the adapter, cache and price service.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker symbol |
//! | [`OwnerId`] | Cache partition owner |
//! | [`TradingDate`] | `YYYY-MM-DD` calendar day |
//! | [`UtcDateTime`] | RFC3339 UTC timestamp |
//! | [`DailyBar`] | Upstream daily OHLCV aggregate |
//! | [`PriceData`] | Price record returned to callers |
//! | [`HoldingSnapshot`] | Derived holding analytics |

mod date;
mod models;
mod owner;
mod symbol;

pub use date::{TradingDate, UtcDateTime};
pub use models::{DailyBar, HoldingSnapshot, PriceData};
pub use owner::OwnerId;
pub use symbol::Symbol;
