mod historical;
mod history;
mod holding;
mod quote;

use std::sync::Arc;
use std::time::Duration;

use pricecache_core::{
    CacheStore, DocumentStore, DocumentStoreConfig, DuckDbCacheStore, MemoryCacheStore, OwnerId,
    PolygonAdapter, PriceCacheConfig, PriceService, ReqwestHttpClient, ThrottleConfig,
};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered command output plus whether the lookup produced data.
pub struct CommandOutcome {
    pub data: Value,
    pub success: bool,
}

impl CommandOutcome {
    pub fn new(data: Value, success: bool) -> Self {
        Self { data, success }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    let mut config = PriceCacheConfig::from_env()?;
    if let Some(min_delay_ms) = cli.min_delay_ms {
        config.throttle = ThrottleConfig::new(Duration::from_millis(min_delay_ms));
    }

    let owner = OwnerId::parse(&cli.owner)?;
    let service = build_service(&config, cli.memory)?;

    match &cli.command {
        Command::Quote(args) => quote::run(args, &service, &owner).await,
        Command::Historical(args) => historical::run(args, &service, &owner).await,
        Command::History(args) => history::run(args, &service, &owner).await,
        Command::Holding(command) => holding::run(command, &service, &owner).await,
    }
}

fn build_service(config: &PriceCacheConfig, memory: bool) -> Result<PriceService, CliError> {
    let source = PolygonAdapter::new(Arc::new(ReqwestHttpClient::new()), config.api_key.clone())
        .with_base_url(config.base_url.clone())
        .with_timeout_ms(config.request_timeout_ms);

    let store: Arc<dyn CacheStore> = if memory {
        Arc::new(MemoryCacheStore::new())
    } else {
        let path = config.cache_db_path();
        debug!(path = %path.display(), "opening cache database");
        Arc::new(DuckDbCacheStore::new(DocumentStore::open(
            DocumentStoreConfig::file(path),
        )?))
    };

    Ok(PriceService::builder(Arc::new(source), store)
        .with_throttle(config.throttle)
        .with_policy(config.cache_policy)
        .build())
}
