use pricecache_core::{OwnerId, PriceService, Symbol, TradingDate};

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    args: &HistoryArgs,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let from = TradingDate::parse(&args.from)?;
    let to = TradingDate::parse(&args.to)?;

    let result = service.get_history(owner, &symbol, from, to).await;
    let success = result.success;
    Ok(CommandOutcome::new(serde_json::to_value(result)?, success))
}
