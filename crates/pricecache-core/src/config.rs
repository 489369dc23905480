//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PRICECACHE_POLYGON_API_KEY` | `demo` |
//! | `PRICECACHE_POLYGON_BASE_URL` | `https://api.polygon.io` |
//! | `PRICECACHE_MIN_REQUEST_DELAY_MS` | `12000` |
//! | `PRICECACHE_MAX_CACHE_AGE_SECS` | `3600` |
//! | `PRICECACHE_STALE_AFTER_SECS` | `120` |
//! | `PRICECACHE_REQUEST_TIMEOUT_MS` | `5000` |
//! | `PRICECACHE_HOME` | `$HOME/.pricecache` |

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CachePolicy;
use crate::throttling::ThrottleConfig;

pub const API_KEY_VAR: &str = "PRICECACHE_POLYGON_API_KEY";
pub const BASE_URL_VAR: &str = "PRICECACHE_POLYGON_BASE_URL";
pub const MIN_DELAY_VAR: &str = "PRICECACHE_MIN_REQUEST_DELAY_MS";
pub const MAX_AGE_VAR: &str = "PRICECACHE_MAX_CACHE_AGE_SECS";
pub const STALE_AFTER_VAR: &str = "PRICECACHE_STALE_AFTER_SECS";
pub const TIMEOUT_VAR: &str = "PRICECACHE_REQUEST_TIMEOUT_MS";
pub const HOME_VAR: &str = "PRICECACHE_HOME";

const DEFAULT_API_KEY: &str = "demo";
const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("stale threshold ({stale_after_secs}s) exceeds max cache age ({max_age_secs}s)")]
    StaleAfterExceedsMaxAge {
        stale_after_secs: u64,
        max_age_secs: u64,
    },
}

/// Runtime configuration for the price service and its upstream adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct PriceCacheConfig {
    pub api_key: String,
    pub base_url: String,
    pub throttle: ThrottleConfig,
    pub cache_policy: CachePolicy,
    pub request_timeout_ms: u64,
    pub home: PathBuf,
}

impl Debug for PriceCacheConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCacheConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("throttle", &self.throttle)
            .field("cache_policy", &self.cache_policy)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("home", &self.home)
            .finish()
    }
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            api_key: String::from(DEFAULT_API_KEY),
            base_url: String::from(DEFAULT_BASE_URL),
            throttle: ThrottleConfig::default(),
            cache_policy: CachePolicy::default(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            home: default_home(std::env::var_os("HOME").map(PathBuf::from)),
        }
    }
}

impl PriceCacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let defaults = Self::default();
        let api_key = get(API_KEY_VAR).unwrap_or(defaults.api_key);
        let base_url = get(BASE_URL_VAR).unwrap_or(defaults.base_url);

        let min_delay_ms = parse_u64(MIN_DELAY_VAR, get(MIN_DELAY_VAR))?
            .unwrap_or(duration_millis(defaults.throttle.min_delay));
        let max_age_secs = parse_u64(MAX_AGE_VAR, get(MAX_AGE_VAR))?
            .unwrap_or(defaults.cache_policy.max_age().as_secs());
        let stale_after_secs = parse_u64(STALE_AFTER_VAR, get(STALE_AFTER_VAR))?
            .unwrap_or(defaults.cache_policy.stale_after().as_secs());
        let request_timeout_ms =
            parse_u64(TIMEOUT_VAR, get(TIMEOUT_VAR))?.unwrap_or(defaults.request_timeout_ms);

        if request_timeout_ms == 0 {
            return Err(ConfigError::Zero { name: TIMEOUT_VAR });
        }
        if stale_after_secs > max_age_secs {
            return Err(ConfigError::StaleAfterExceedsMaxAge {
                stale_after_secs,
                max_age_secs,
            });
        }

        let home = match get(HOME_VAR) {
            Some(path) => PathBuf::from(path),
            None => default_home(lookup("HOME").map(PathBuf::from)),
        };

        Ok(Self {
            api_key,
            base_url,
            throttle: ThrottleConfig::new(Duration::from_millis(min_delay_ms)),
            cache_policy: CachePolicy::new(
                Duration::from_secs(max_age_secs),
                Duration::from_secs(stale_after_secs),
            ),
            request_timeout_ms,
            home,
        })
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.home.join("cache").join("price_cache.duckdb")
    }
}

fn default_home(user_home: Option<PathBuf>) -> PathBuf {
    match user_home {
        Some(home) if !home.as_os_str().is_empty() => home.join(".pricecache"),
        _ => PathBuf::from(".pricecache"),
    }
}

fn parse_u64(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { name, value: raw })
        })
        .transpose()
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
