//! Configuration module for candlecast.
//!
//! Structured configuration loaded from environment variables, organized by
//! concern: market data, live streams, model, simulation, signals,
//! notifications and observability. Unparseable values fall back to their
//! defaults; malformed URLs are rejected.

mod market_config;
mod model_config;
mod notifier_config;
mod observability_config;
mod signal_config;
mod simulation_config;
mod stream_config;

pub use market_config::MarketEnvConfig;
pub use model_config::ModelEnvConfig;
pub use notifier_config::NotifierEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use signal_config::SignalEnvConfig;
pub use simulation_config::SimulationEnvConfig;
pub use stream_config::StreamEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

pub(crate) type VarSource<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Reads `key`, falling back to `default` when unset or unparseable
pub(crate) fn read_or<T: FromStr>(vars: VarSource<'_>, key: &str, default: T) -> T {
    vars(key)
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_string(vars: VarSource<'_>, key: &str, default: &str) -> String {
    vars(key)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn validate_url(name: &str, value: &str) -> Result<()> {
    url::Url::parse(value).with_context(|| format!("Invalid {}: {}", name, value))?;
    Ok(())
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub market: MarketEnvConfig,
    pub stream: StreamEnvConfig,
    pub model: ModelEnvConfig,
    pub simulation: SimulationEnvConfig,
    pub signal: SignalEnvConfig,
    pub notifier: NotifierEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://candlecast.db".to_string(),
            market: MarketEnvConfig::default(),
            stream: StreamEnvConfig::default(),
            model: ModelEnvConfig::default(),
            simulation: SimulationEnvConfig::default(),
            signal: SignalEnvConfig::default(),
            notifier: NotifierEnvConfig::default(),
            observability: ObservabilityEnvConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Result<Self> {
        let config = Self {
            database_url: read_string(vars, "DATABASE_URL", "sqlite://candlecast.db"),
            market: MarketEnvConfig::from_vars(vars),
            stream: StreamEnvConfig::from_vars(vars),
            model: ModelEnvConfig::from_vars(vars),
            simulation: SimulationEnvConfig::from_vars(vars),
            signal: SignalEnvConfig::from_vars(vars),
            notifier: NotifierEnvConfig::from_vars(vars),
            observability: ObservabilityEnvConfig::from_vars(vars),
        };
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_url("BINANCE_BASE_URL", &self.market.base_url)?;
        validate_url("BINANCE_WS_URL", &self.market.ws_url)?;
        validate_url("TELEGRAM_API_URL", &self.notifier.api_url)?;
        if self.model.window_size == 0 {
            anyhow::bail!("WINDOW_SIZE must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    pub fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::vars;
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_vars(&vars(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite://candlecast.db");
        assert_eq!(config.market.fetch_limit, 200);
        assert_eq!(config.signal.confidence_threshold, 70);
        assert_eq!(config.model.window_size, 5);
        assert!(config.notifier.bot_token.is_none());
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = Config::from_vars(&vars(&[
            ("FETCH_RETRIES", "many"),
            ("CONFIDENCE_THRESHOLD", "85"),
        ]))
        .unwrap();
        assert_eq!(config.market.retries, 3);
        assert_eq!(config.signal.confidence_threshold, 85);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = Config::from_vars(&vars(&[("BINANCE_BASE_URL", "not a url")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(Config::from_vars(&vars(&[("WINDOW_SIZE", "0")])).is_err());
    }
}
