//! Node configuration.
//!
//! Defaults can be overridden through environment variables:
//!
//! | Variable                | Meaning                              | Default  |
//! |-------------------------|--------------------------------------|----------|
//! | `LEDGER_BLOCK_TIME_MS`  | interval between produced blocks     | `5000`   |
//! | `LEDGER_POOL_CAPACITY`  | maximum pending transactions         | `100000` |
//! | `LEDGER_LOG_LEVEL`      | `debug`, `info`, `warn` or `error`   | `info`   |
//! | `LEDGER_VALIDATOR`      | produce blocks (`true`/`false`)      | `true`   |
//! | `LEDGER_TX_INTERVAL_MS` | demo transaction submission interval | `50`     |

use crate::crypto::key_pair::PrivateKey;
use crate::node::server::{BLOCK_TIME, ServerOps};
use crate::node::txpool::TXPOOL_CAPACITY;
use crate::utils::log::Level;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BLOCK_TIME_MS: &str = "LEDGER_BLOCK_TIME_MS";
pub const ENV_POOL_CAPACITY: &str = "LEDGER_POOL_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "LEDGER_LOG_LEVEL";
pub const ENV_VALIDATOR: &str = "LEDGER_VALIDATOR";
pub const ENV_TX_INTERVAL_MS: &str = "LEDGER_TX_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings for a ledger node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub block_time: Duration,
    pub pool_capacity: usize,
    pub log_level: Level,
    pub validator: bool,
    /// Pause between demo transactions submitted by the node binary.
    pub tx_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            block_time: BLOCK_TIME,
            pool_capacity: TXPOOL_CAPACITY,
            log_level: Level::Info,
            validator: true,
            tx_interval: Duration::from_millis(50),
        }
    }
}

impl NodeConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BLOCK_TIME_MS) {
            config.block_time = parse_millis(ENV_BLOCK_TIME_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POOL_CAPACITY) {
            config.pool_capacity = parse_positive(ENV_POOL_CAPACITY, &value)? as usize;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            config.log_level = value
                .parse()
                .map_err(|reason| invalid(ENV_LOG_LEVEL, &value, reason))?;
        }
        if let Some(value) = lookup(ENV_VALIDATOR) {
            config.validator = parse_bool(ENV_VALIDATOR, &value)?;
        }
        if let Some(value) = lookup(ENV_TX_INTERVAL_MS) {
            config.tx_interval = parse_millis(ENV_TX_INTERVAL_MS, &value)?;
        }

        Ok(config)
    }

    /// Producer options; `private_key` is only kept when validator mode is on.
    pub fn server_ops(&self, private_key: Option<PrivateKey>) -> ServerOps {
        ServerOps {
            private_key: private_key.filter(|_| self.validator),
            transaction_pool_capacity: Some(self.pool_capacity),
            block_time: self.block_time,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(invalid(key, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(key, value, e.to_string())),
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_positive(key, value).map(Duration::from_millis)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}
