//! CLI argument definitions for pricecache.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Current prices for one or more symbols |
//! | `historical` | Closing price on one date |
//! | `history` | Daily bars for a date range, backfilling the cache |
//! | `holding set` | Cache holding analytics for a position |
//! | `holding show` | Read cached holding analytics |
//!
//! # Examples
//!
//! ```bash
//! pricecache quote AAPL MSFT --pretty
//! pricecache historical TSLA 2024-01-05
//! pricecache history NVDA 2024-01-01 2024-01-31
//! pricecache holding set AAPL --shares 10 --avg-price 150
//! ```

use clap::{Args, Parser, Subcommand};

/// Rate-limited, cache-first stock prices from Polygon.
///
/// Upstream settings come from `PRICECACHE_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "pricecache", author, version, about = "Rate-limited, cache-first stock prices")]
pub struct Cli {
    /// Cache partition to read and write.
    #[arg(long, global = true, default_value = "local")]
    pub owner: String,

    /// Use a throwaway in-memory cache instead of the DuckDB file.
    #[arg(long, global = true, default_value_t = false)]
    pub memory: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Override the minimum delay between upstream requests.
    #[arg(long, global = true)]
    pub min_delay_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Current prices for one or more symbols.
    Quote(QuoteArgs),
    /// Closing price of a symbol on one date.
    Historical(HistoricalArgs),
    /// Daily bars for a date range.
    History(HistoryArgs),
    /// Holding analytics snapshots.
    #[command(subcommand)]
    Holding(HoldingCommand),
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    #[arg(required = true)]
    pub symbols: Vec<String>,

    /// Skip the cache and fetch from upstream.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct HistoricalArgs {
    pub symbol: String,

    /// Trading day as YYYY-MM-DD.
    pub date: String,

    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Subcommand)]
pub enum HoldingCommand {
    /// Compute and cache analytics for a position.
    Set(HoldingSetArgs),
    /// Show cached analytics for a symbol.
    Show(HoldingShowArgs),
}

#[derive(Debug, Args)]
pub struct HoldingSetArgs {
    pub symbol: String,

    #[arg(long)]
    pub shares: f64,

    #[arg(long)]
    pub avg_price: f64,

    /// Mark price; defaults to the current price.
    #[arg(long)]
    pub price: Option<f64>,
}

#[derive(Debug, Args)]
pub struct HoldingShowArgs {
    pub symbol: String,
}
