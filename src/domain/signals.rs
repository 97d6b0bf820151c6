use crate::domain::market::SeriesKey;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Long,
    Short,
    Wait,
}

impl SignalType {
    /// Class index used by predictor outputs and labels
    pub fn class_index(&self) -> usize {
        match self {
            SignalType::Long => 0,
            SignalType::Short => 1,
            SignalType::Wait => 2,
        }
    }

    pub fn from_class_index(index: usize) -> Self {
        match index {
            0 => SignalType::Long,
            1 => SignalType::Short,
            _ => SignalType::Wait,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, SignalType::Wait)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Long => "LONG",
            SignalType::Short => "SHORT",
            SignalType::Wait => "WAIT",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(SignalType::Long),
            "SHORT" => Ok(SignalType::Short),
            "WAIT" => Ok(SignalType::Wait),
            other => Err(anyhow!("Unknown signal type: {}", other)),
        }
    }
}

/// Entry / stop-loss / take-profit prices of a hypothetical trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl TradeLevels {
    /// Reward to risk ratio, 0 when risk is zero
    pub fn risk_reward(&self) -> f64 {
        let risk = (self.entry - self.stop_loss).abs();
        if risk <= f64::EPSILON {
            return 0.0;
        }
        (self.take_profit - self.entry).abs() / risk
    }
}

/// A signal derived from one prediction at one point of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub signal_type: SignalType,
    /// Winning probability rounded to percent (0..=100)
    pub confidence: u8,
    pub probability: f64,
    pub price: f64,
    pub atr: f64,
    pub levels: TradeLevels,
    /// Timestamp (ms) of the candle the signal was derived on
    pub timestamp: i64,
}

impl TradeSignal {
    /// Leverage hint: probability scaled to 0..=10
    pub fn leverage_hint(&self) -> u8 {
        (self.probability * 10.0).round().clamp(0.0, 10.0) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    LastClose,
}

/// Result of a forward scan over candles after a signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub exit_price: f64,
    pub profit_pct: f64,
    pub exit_reason: ExitReason,
}

/// Persisted signal with its (possibly pending) outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub chat_id: i64,
    pub series: SeriesKey,
    pub signal_type: SignalType,
    pub confidence: u8,
    pub timestamp: i64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_price: Option<f64>,
    pub profit: Option<f64>,
}

impl SignalRecord {
    pub fn from_signal(chat_id: i64, series: SeriesKey, signal: &TradeSignal) -> Self {
        Self {
            id: None,
            chat_id,
            series,
            signal_type: signal.signal_type,
            confidence: signal.confidence,
            timestamp: signal.timestamp,
            entry_price: signal.levels.entry,
            stop_loss: signal.levels.stop_loss,
            take_profit: signal.levels.take_profit,
            exit_price: None,
            profit: None,
        }
    }

    pub fn with_outcome(mut self, outcome: Option<TradeOutcome>) -> Self {
        if let Some(outcome) = outcome {
            self.exit_price = Some(outcome.exit_price);
            self.profit = Some(outcome.profit_pct);
        }
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.exit_price.is_some() && self.profit.is_some()
    }

    pub fn levels(&self) -> TradeLevels {
        TradeLevels {
            entry: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_parsing() {
        assert_eq!("long".parse::<SignalType>().unwrap(), SignalType::Long);
        assert_eq!("SHORT".parse::<SignalType>().unwrap(), SignalType::Short);
        assert!("HOLD".parse::<SignalType>().is_err());
        for t in [SignalType::Long, SignalType::Short, SignalType::Wait] {
            assert_eq!(SignalType::from_class_index(t.class_index()), t);
        }
    }

    #[test]
    fn test_risk_reward() {
        let levels = TradeLevels {
            entry: 100.0,
            stop_loss: 95.0,
            take_profit: 110.0,
        };
        assert!((levels.risk_reward() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_leverage_hint_is_capped() {
        let signal = TradeSignal {
            signal_type: SignalType::Long,
            confidence: 87,
            probability: 0.87,
            price: 1.0,
            atr: 0.1,
            levels: TradeLevels {
                entry: 1.0,
                stop_loss: 0.9,
                take_profit: 1.2,
            },
            timestamp: 0,
        };
        assert_eq!(signal.leverage_hint(), 9);
        let capped = TradeSignal {
            probability: 1.4,
            ..signal
        };
        assert_eq!(capped.leverage_hint(), 10);
    }
}
