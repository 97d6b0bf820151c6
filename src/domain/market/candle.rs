use serde::{Deserialize, Serialize};

/// One OHLCV bar. `timestamp` is the bar open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Exchange data sanity check: positive prices, non-negative volume, high >= low.
    pub fn is_valid(&self) -> bool {
        self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
            && self.high >= self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_validation() {
        assert!(Candle::new(0, 10.0, 11.0, 9.0, 10.5, 100.0).is_valid());
        assert!(!Candle::new(0, 10.0, 9.0, 11.0, 10.5, 100.0).is_valid());
        assert!(!Candle::new(0, 0.0, 11.0, 9.0, 10.5, 100.0).is_valid());
        assert!(!Candle::new(0, 10.0, 11.0, 9.0, 10.5, -1.0).is_valid());
    }

    #[test]
    fn test_typical_price() {
        let candle = Candle::new(0, 10.0, 12.0, 9.0, 12.0, 1.0);
        assert!((candle.typical_price() - 11.0).abs() < 1e-12);
    }
}
