use crate::domain::market::{SeriesKey, Timeframe};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (chat, symbol, pair, timeframe) tuple under automated monitoring
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchConfig {
    pub chat_id: i64,
    pub series: SeriesKey,
}

impl WatchConfig {
    pub fn new(chat_id: i64, symbol: &str, pair: &str, timeframe: Timeframe) -> Self {
        Self {
            chat_id,
            series: SeriesKey::new(symbol, pair, timeframe),
        }
    }

    pub fn key(&self) -> ConfigKey {
        ConfigKey(format!(
            "{}_{}_{}_{}",
            self.chat_id, self.series.symbol, self.series.pair, self.series.timeframe
        ))
    }
}

/// Stable string identity of a WatchConfig, used for cursors and signal buffers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey(pub String);

impl ConfigKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_key_is_unique_per_tuple() {
        let a = WatchConfig::new(42, "btc", "usdt", Timeframe::OneHour);
        let b = WatchConfig::new(42, "BTC", "USDT", Timeframe::OneHour);
        let c = WatchConfig::new(43, "BTC", "USDT", Timeframe::OneHour);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().as_str(), "42_BTC_USDT_1h");
    }
}
