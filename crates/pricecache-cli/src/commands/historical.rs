use pricecache_core::{OwnerId, PriceService, Symbol, TradingDate};

use crate::cli::HistoricalArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    args: &HistoricalArgs,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let date = TradingDate::parse(&args.date)?;

    let result = service
        .get_historical(owner, &symbol, date, args.force)
        .await;
    let success = result.success;
    Ok(CommandOutcome::new(serde_json::to_value(result)?, success))
}
