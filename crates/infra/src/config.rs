//! Configuration management.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

const DEV_TOKEN_SALT: &str = "dev-flashsale-salt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration.
///
/// The salt and both connection URLs may carry credentials; `Debug` redacts
/// them so the config can be logged.
#[derive(Clone)]
pub struct FlashSaleConfig {
    /// Secret mixed into every exposure token digest.
    pub token_salt: String,
    /// Postgres connection URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Redis connection URL for the item cache; an in-memory cache is used when absent.
    pub redis_url: Option<String>,
    /// TTL applied to cached sale items.
    pub cache_ttl_secs: u64,
    /// Maximum number of items returned by `list_active`.
    pub list_limit: usize,
}

impl fmt::Debug for FlashSaleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashSaleConfig")
            .field("token_salt", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("database_max_connections", &self.database_max_connections)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("list_limit", &self.list_limit)
            .finish()
    }
}

impl Default for FlashSaleConfig {
    fn default() -> Self {
        Self {
            token_salt: DEV_TOKEN_SALT.to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            cache_ttl_secs: 3600,
            list_limit: 4,
        }
    }
}

impl FlashSaleConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let token_salt = match lookup("FLASHSALE_TOKEN_SALT").filter(|s| !s.is_empty()) {
            Some(salt) => salt,
            None => {
                warn!("FLASHSALE_TOKEN_SALT not set; using insecure dev default");
                defaults.token_salt
            }
        };

        Ok(Self {
            token_salt,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            redis_url: lookup("REDIS_URL").filter(|s| !s.is_empty()),
            cache_ttl_secs: parse_or(&lookup, "FLASHSALE_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            list_limit: parse_or(&lookup, "FLASHSALE_LIST_LIMIT", defaults.list_limit)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
