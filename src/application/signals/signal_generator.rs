use crate::domain::ml::Prediction;
use crate::domain::ml::feature_registry::IndicatorSnapshot;
use crate::domain::signals::{SignalType, TradeLevels, TradeSignal};
use tracing::debug;

/// Minimum class probability for a directional call
pub const DEFAULT_MIN_PROBABILITY: f64 = 0.5;
/// Confidence ceiling for a call downgraded to WAIT
const DOWNGRADED_CONFIDENCE_CAP: u8 = 50;

/// Turns a prediction into a signal with entry, stop-loss and take-profit.
///
/// Levels are ATR multiples around the current price, clipped to the current
/// support and resistance. A directional call whose clipped levels no longer
/// bracket the entry is downgraded to WAIT.
#[derive(Debug, Clone, Copy)]
pub struct SignalGenerator {
    min_probability: f64,
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PROBABILITY)
    }
}

impl SignalGenerator {
    pub fn new(min_probability: f64) -> Self {
        Self { min_probability }
    }

    pub fn derive(
        &self,
        prediction: &Prediction,
        snapshot: &IndicatorSnapshot,
        timestamp: i64,
    ) -> TradeSignal {
        let (best, probability) = prediction.argmax();
        let signal_type = if best.is_directional() && probability >= self.min_probability {
            best
        } else {
            SignalType::Wait
        };
        let confidence = (probability * 100.0).round().clamp(0.0, 100.0) as u8;

        let price = snapshot.price;
        let atr = snapshot.atr_or_floor();
        let entry = price + prediction.entry_delta * atr;

        let levels = match signal_type {
            SignalType::Long => {
                let mut take_profit = entry + prediction.tp_delta * atr;
                let mut stop_loss = entry - prediction.sl_delta * atr;
                if snapshot.resistance > 0.0 {
                    take_profit = take_profit.min(snapshot.resistance);
                }
                if snapshot.support > 0.0 {
                    stop_loss = stop_loss.max(snapshot.support);
                }
                TradeLevels {
                    entry,
                    stop_loss,
                    take_profit,
                }
            }
            SignalType::Short => {
                let mut take_profit = entry - prediction.tp_delta * atr;
                let mut stop_loss = entry + prediction.sl_delta * atr;
                if snapshot.support > 0.0 {
                    take_profit = take_profit.max(snapshot.support);
                }
                if snapshot.resistance > 0.0 {
                    stop_loss = stop_loss.min(snapshot.resistance);
                }
                TradeLevels {
                    entry,
                    stop_loss,
                    take_profit,
                }
            }
            SignalType::Wait => TradeLevels {
                entry: price,
                stop_loss: price,
                take_profit: price,
            },
        };

        if signal_type.is_directional() && !Self::levels_valid(signal_type, &levels) {
            debug!(
                "SignalGenerator: {} levels invalid (entry {:.6}, sl {:.6}, tp {:.6}), downgrading to WAIT",
                signal_type, levels.entry, levels.stop_loss, levels.take_profit
            );
            return TradeSignal {
                signal_type: SignalType::Wait,
                confidence: confidence.min(DOWNGRADED_CONFIDENCE_CAP),
                probability,
                price,
                atr,
                levels: TradeLevels {
                    entry: price,
                    stop_loss: price,
                    take_profit: price,
                },
                timestamp,
            };
        }

        TradeSignal {
            signal_type,
            confidence,
            probability,
            price,
            atr,
            levels,
            timestamp,
        }
    }

    fn levels_valid(side: SignalType, levels: &TradeLevels) -> bool {
        let finite = levels.entry.is_finite()
            && levels.stop_loss.is_finite()
            && levels.take_profit.is_finite();
        if !finite || levels.entry <= 0.0 || levels.stop_loss <= 0.0 || levels.take_profit <= 0.0 {
            return false;
        }
        match side {
            SignalType::Long => levels.stop_loss < levels.entry && levels.entry < levels.take_profit,
            SignalType::Short => levels.take_profit < levels.entry && levels.entry < levels.stop_loss,
            SignalType::Wait => true,
        }
    }
}
