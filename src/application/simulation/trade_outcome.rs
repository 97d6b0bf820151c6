use crate::domain::market::Candle;
use crate::domain::signals::{ExitReason, SignalType, TradeLevels, TradeOutcome};

/// Replays candles after a signal to find where the hypothetical trade exits.
///
/// Stop-loss is checked before take-profit on every candle. When neither level
/// is touched the trade is closed at the last available close.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeOutcomeEvaluator;

impl TradeOutcomeEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Returns `None` for WAIT signals or when no candle follows `signal_timestamp`
    pub fn evaluate(
        &self,
        side: SignalType,
        levels: &TradeLevels,
        signal_timestamp: i64,
        candles: &[Candle],
    ) -> Option<TradeOutcome> {
        if !side.is_directional() || levels.entry <= 0.0 {
            return None;
        }

        let mut last_close = None;
        for candle in candles.iter().filter(|c| c.timestamp > signal_timestamp) {
            let (stop_hit, target_hit) = match side {
                SignalType::Long => (
                    candle.low <= levels.stop_loss,
                    candle.high >= levels.take_profit,
                ),
                SignalType::Short => (
                    candle.high >= levels.stop_loss,
                    candle.low <= levels.take_profit,
                ),
                SignalType::Wait => return None,
            };

            if stop_hit {
                return Some(Self::close(side, levels.entry, levels.stop_loss, ExitReason::StopLoss));
            }
            if target_hit {
                return Some(Self::close(
                    side,
                    levels.entry,
                    levels.take_profit,
                    ExitReason::TakeProfit,
                ));
            }
            last_close = Some(candle.close);
        }

        last_close.map(|close| Self::close(side, levels.entry, close, ExitReason::LastClose))
    }

    fn close(side: SignalType, entry: f64, exit: f64, reason: ExitReason) -> TradeOutcome {
        let direction = if side == SignalType::Short { -1.0 } else { 1.0 };
        TradeOutcome {
            exit_price: exit,
            profit_pct: direction * (exit - entry) * 100.0 / entry,
            exit_reason: reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(ts, close, high, low, close, 10.0)
    }

    fn long_levels() -> TradeLevels {
        TradeLevels {
            entry: 100.0,
            stop_loss: 95.0,
            take_profit: 110.0,
        }
    }

    #[test]
    fn test_long_stop_loss() {
        let candles = vec![candle(1, 101.0, 98.0, 99.0), candle(2, 100.0, 94.0, 96.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Long, &long_levels(), 0, &candles)
            .unwrap();
        assert_eq!(outcome.exit_price, 95.0);
        assert_eq!(outcome.profit_pct, -5.0);
        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_long_take_profit() {
        let candles = vec![candle(1, 104.0, 99.0, 103.0), candle(2, 111.0, 102.0, 109.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Long, &long_levels(), 0, &candles)
            .unwrap();
        assert_eq!(outcome.exit_price, 110.0);
        assert_eq!(outcome.profit_pct, 10.0);
        assert_eq!(outcome.exit_reason, ExitReason::TakeProfit);
    }

    #[test]
    fn test_same_candle_prefers_stop_loss() {
        let candles = vec![candle(1, 112.0, 94.0, 100.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Long, &long_levels(), 0, &candles)
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_short_is_symmetric() {
        let levels = TradeLevels {
            entry: 100.0,
            stop_loss: 105.0,
            take_profit: 90.0,
        };
        let hit_tp = vec![candle(1, 101.0, 89.0, 91.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Short, &levels, 0, &hit_tp)
            .unwrap();
        assert_eq!(outcome.exit_price, 90.0);
        assert_eq!(outcome.profit_pct, 10.0);

        let hit_sl = vec![candle(1, 106.0, 99.0, 104.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Short, &levels, 0, &hit_sl)
            .unwrap();
        assert_eq!(outcome.exit_price, 105.0);
        assert_eq!(outcome.profit_pct, -5.0);
    }

    #[test]
    fn test_falls_back_to_last_close() {
        let candles = vec![candle(1, 103.0, 97.0, 101.0), candle(2, 104.0, 98.0, 102.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Long, &long_levels(), 0, &candles)
            .unwrap();
        assert_eq!(outcome.exit_price, 102.0);
        assert!((outcome.profit_pct - 2.0).abs() < 1e-9);
        assert_eq!(outcome.exit_reason, ExitReason::LastClose);
    }

    #[test]
    fn test_only_candles_after_signal_count() {
        let candles = vec![candle(5, 100.0, 90.0, 95.0), candle(6, 103.0, 99.0, 101.0)];
        let outcome = TradeOutcomeEvaluator
            .evaluate(SignalType::Long, &long_levels(), 5, &candles)
            .unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::LastClose);

        assert!(
            TradeOutcomeEvaluator
                .evaluate(SignalType::Long, &long_levels(), 6, &candles)
                .is_none()
        );
        assert!(
            TradeOutcomeEvaluator
                .evaluate(SignalType::Wait, &long_levels(), 0, &candles)
                .is_none()
        );
    }
}
