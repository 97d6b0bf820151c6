use super::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one candle series: (symbol, pair, timeframe).
///
/// Symbol and pair are stored upper-case so `btc/usdt` and `BTC/USDT`
/// share cache entries, subscriptions and cursors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub pair: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: &str, pair: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            pair: pair.trim().to_uppercase(),
            timeframe,
        }
    }

    /// Exchange market symbol, e.g. `BTCUSDT`
    pub fn market_symbol(&self) -> String {
        format!("{}{}", self.symbol, self.pair)
    }

    /// Binance combined-stream name, e.g. `btcusdt@kline_1h`
    pub fn stream_name(&self) -> String {
        format!(
            "{}@kline_{}",
            self.market_symbol().to_lowercase(),
            self.timeframe.to_binance_string()
        )
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.symbol, self.pair, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalises_case() {
        let a = SeriesKey::new("btc", "usdt", Timeframe::OneHour);
        let b = SeriesKey::new("BTC", "USDT", Timeframe::OneHour);
        assert_eq!(a, b);
        assert_eq!(a.market_symbol(), "BTCUSDT");
        assert_eq!(a.stream_name(), "btcusdt@kline_1h");
        assert_eq!(a.to_string(), "BTC/USDT (1h)");
    }
}
