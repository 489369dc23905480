use pricecache_core::{OwnerId, PriceService, Symbol};

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    args: &QuoteArgs,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if let [symbol] = symbols.as_slice() {
        let result = service.get(owner, symbol, args.force).await;
        let success = result.success;
        return Ok(CommandOutcome::new(serde_json::to_value(result)?, success));
    }

    let batch = service.get_many(owner, &symbols, args.force).await;
    let complete = symbols.iter().all(|symbol| batch.data.contains_key(symbol));
    Ok(CommandOutcome::new(serde_json::to_value(batch)?, complete))
}
