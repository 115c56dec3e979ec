//! Process configuration, loaded once at startup (§A.3 ambient stack).
//!
//! Grounded on the `config` crate builder idiom used for per-service config
//! structs in the pack (`crates/gateway/src/config.rs`): environment
//! variables layered over defaults, deserialized into one flat struct.

use serde::{Deserialize, Serialize};

/// Default HTTP/WS bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Connection string for the persistent store. Absent => in-memory
    /// backend (local/offline demo mode, §B.2).
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_ticker_interval_secs")]
    pub ticker_interval_secs: u64,
    #[serde(default = "default_max_sessions_per_team")]
    pub max_sessions_per_team: usize,
    #[serde(default = "default_orders_per_min")]
    pub orders_per_min: u32,
    /// `TK-`-prefixed admin bearer keys (§6).
    #[serde(default)]
    pub admin_api_keys: Vec<String>,
    #[serde(default = "default_resync_lookback_secs")]
    pub resync_default_lookback_secs: i64,
    #[serde(default)]
    pub debug_mode_default: bool,
    #[serde(default = "default_products")]
    pub products: Vec<String>,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}
fn default_read_timeout_secs() -> u64 {
    90
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_ticker_interval_secs() -> u64 {
    2
}
fn default_max_sessions_per_team() -> usize {
    8
}
fn default_orders_per_min() -> u32 {
    120
}
fn default_resync_lookback_secs() -> i64 {
    86_400
}
fn default_products() -> Vec<String> {
    vec!["GUACA".to_string(), "FOSFO".to_string(), "PITA".to_string()]
}

impl AppConfig {
    /// Loads from environment, `dotenvy`-populated by the caller first.
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXCHANGE").separator("__"))
            .build()?;

        cfg.try_deserialize().or_else(|_| Ok(Self::default()))
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.is_none()
    }

    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self::default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: default_bind_addr(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            ticker_interval_secs: default_ticker_interval_secs(),
            max_sessions_per_team: default_max_sessions_per_team(),
            orders_per_min: default_orders_per_min(),
            admin_api_keys: Vec::new(),
            resync_default_lookback_secs: default_resync_lookback_secs(),
            debug_mode_default: false,
            products: default_products(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.is_in_memory());
        assert!(cfg.orders_per_min > 0);
        assert!(!cfg.products.is_empty());
    }
}
