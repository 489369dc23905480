use pricecache_core::{HoldingSnapshot, OwnerId, PriceService, Symbol};
use serde_json::json;

use crate::cli::{HoldingCommand, HoldingSetArgs, HoldingShowArgs};
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    command: &HoldingCommand,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    match command {
        HoldingCommand::Set(args) => set(args, service, owner).await,
        HoldingCommand::Show(args) => show(args, service, owner).await,
    }
}

async fn set(
    args: &HoldingSetArgs,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;

    let price = match args.price {
        Some(price) => price,
        None => {
            let current = service.get(owner, &symbol, false).await;
            current.data.map(|data| data.price).ok_or_else(|| {
                CliError::Command(format!(
                    "no current price for {symbol}: {}",
                    current.error.as_deref().unwrap_or("unknown error")
                ))
            })?
        }
    };

    let snapshot = HoldingSnapshot::from_position(symbol, args.shares, args.avg_price, price)?;
    service.cache_holding(owner, &snapshot).await?;

    Ok(CommandOutcome::new(
        json!({ "success": true, "data": snapshot }),
        true,
    ))
}

async fn show(
    args: &HoldingShowArgs,
    service: &PriceService,
    owner: &OwnerId,
) -> Result<CommandOutcome, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;

    match service.cached_holding(owner, &symbol).await {
        Some(snapshot) => Ok(CommandOutcome::new(
            json!({ "success": true, "data": snapshot }),
            true,
        )),
        None => Ok(CommandOutcome::new(
            json!({ "success": false, "error": format!("no cached holding for {symbol}") }),
            false,
        )),
    }
}
