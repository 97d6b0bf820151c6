//! Binance REST and WebSocket endpoints and fetch policy.

use super::{VarSource, process_env, read_or, read_string};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MarketEnvConfig {
    pub base_url: String,
    pub ws_url: String,
    pub fetch_timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub fetch_limit: usize,
    pub validity_timeout_secs: u64,
}

impl Default for MarketEnvConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443".to_string(),
            fetch_timeout_secs: 10,
            retries: 3,
            retry_delay_ms: 5000,
            fetch_limit: 200,
            validity_timeout_secs: 5,
        }
    }
}

impl MarketEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            base_url: read_string(vars, "BINANCE_BASE_URL", &d.base_url),
            ws_url: read_string(vars, "BINANCE_WS_URL", &d.ws_url),
            fetch_timeout_secs: read_or(vars, "FETCH_TIMEOUT_SECS", d.fetch_timeout_secs),
            retries: read_or(vars, "FETCH_RETRIES", d.retries),
            retry_delay_ms: read_or(vars, "FETCH_RETRY_DELAY_MS", d.retry_delay_ms),
            fetch_limit: read_or(vars, "FETCH_LIMIT", d.fetch_limit),
            validity_timeout_secs: read_or(vars, "VALIDITY_TIMEOUT_SECS", d.validity_timeout_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validity_timeout(&self) -> Duration {
        Duration::from_secs(self.validity_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::vars;

    #[test]
    fn test_market_overrides() {
        let config = MarketEnvConfig::from_vars(&vars(&[
            ("BINANCE_BASE_URL", "https://testnet.binance.vision"),
            ("FETCH_RETRY_DELAY_MS", "250"),
        ]));
        assert_eq!(config.base_url, "https://testnet.binance.vision");
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    }
}
