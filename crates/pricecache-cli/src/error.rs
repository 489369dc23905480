use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] pricecache_core::ValidationError),

    #[error(transparent)]
    Config(#[from] pricecache_core::ConfigError),

    #[error("cache store error: {0}")]
    Store(#[from] pricecache_core::StoreError),

    #[error(transparent)]
    Cache(#[from] pricecache_core::CacheError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Config(_) => 78,
            Self::Serialization(_) => 4,
            Self::Store(_) | Self::Cache(_) => 10,
        }
    }
}
