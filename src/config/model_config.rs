//! Model shape, training rate and the bootstrap series.

use super::{VarSource, process_env, read_or};
use crate::domain::market::{SeriesKey, Timeframe};
use crate::domain::ml::HyperparamConfig;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub window_size: usize,
    pub units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub embedding_dim: usize,
    pub bootstrap_pairs: Vec<SeriesKey>,
}

impl Default for ModelEnvConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            units: 32,
            epochs: 10,
            learning_rate: 0.01,
            embedding_dim: 4,
            bootstrap_pairs: vec![
                SeriesKey::new("BTC", "USDT", Timeframe::OneHour),
                SeriesKey::new("ADA", "USDT", Timeframe::OneHour),
            ],
        }
    }
}

impl ModelEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        let bootstrap_pairs = match vars("BOOTSTRAP_PAIRS") {
            Some(raw) => parse_series_list(&raw),
            None => d.bootstrap_pairs,
        };
        let learning_rate = read_or(vars, "LEARNING_RATE", d.learning_rate);
        Self {
            window_size: read_or(vars, "WINDOW_SIZE", d.window_size),
            units: read_or(vars, "MODEL_UNITS", d.units).max(1),
            epochs: read_or(vars, "MODEL_EPOCHS", d.epochs).max(1),
            learning_rate: if learning_rate.is_finite() && learning_rate > 0.0 {
                learning_rate
            } else {
                d.learning_rate
            },
            embedding_dim: read_or(vars, "EMBEDDING_DIM", d.embedding_dim),
            bootstrap_pairs,
        }
    }

    pub fn hyperparams(&self) -> HyperparamConfig {
        HyperparamConfig {
            window_size: self.window_size,
            units: self.units,
            epochs: self.epochs,
        }
    }
}

/// Parses `SYMBOL/PAIR/TIMEFRAME` entries separated by commas
pub fn parse_series_list(raw: &str) -> Vec<SeriesKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('/').map(str::trim).collect();
            let parsed = match parts.as_slice() {
                [symbol, pair, timeframe] if !symbol.is_empty() && !pair.is_empty() => timeframe
                    .parse::<Timeframe>()
                    .ok()
                    .map(|tf| SeriesKey::new(symbol, pair, tf)),
                _ => None,
            };
            if parsed.is_none() {
                warn!("ModelEnvConfig: Ignoring malformed bootstrap entry '{}'", entry);
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::vars;

    #[test]
    fn test_parse_series_list() {
        let keys = parse_series_list("btc/usdt/1h, ETH/USDT/m15,broken,SOL/USDT/7x");
        assert_eq!(
            keys,
            vec![
                SeriesKey::new("BTC", "USDT", Timeframe::OneHour),
                SeriesKey::new("ETH", "USDT", Timeframe::FifteenMin),
            ]
        );
    }

    #[test]
    fn test_hyperparams_seeded_from_env() {
        let config = ModelEnvConfig::from_vars(&vars(&[
            ("WINDOW_SIZE", "8"),
            ("MODEL_UNITS", "16"),
            ("LEARNING_RATE", "-1"),
        ]));
        let hp = config.hyperparams();
        assert_eq!(hp.window_size, 8);
        assert_eq!(hp.units, 16);
        assert_eq!(hp.epochs, 10);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.bootstrap_pairs.len(), 2);
    }
}
