use crate::domain::market::Candle;
use crate::domain::ml::Label;
use crate::domain::ml::feature_registry::IndicatorSnapshot;
use crate::domain::signals::SignalType;

/// Stop distance used for the regression target, as a fraction of price
const TARGET_STOP_FRACTION: f64 = 0.01;

/// Derives realized training labels from the price move over the `lookahead`
/// candles that follow the next one.
///
/// The labelled candle is the last one the model saw; the horizon is counted
/// from the first unseen candle.
#[derive(Debug, Clone, Copy)]
pub struct Labeler {
    lookahead: usize,
    threshold_pct: f64,
}

impl Labeler {
    pub fn new(lookahead: usize, threshold_pct: f64) -> Self {
        Self {
            lookahead: lookahead.max(1),
            threshold_pct,
        }
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Move threshold in percent: the configured floor or the ATR as a
    /// percentage of price, whichever is larger
    pub fn threshold_pct(&self, snapshot: &IndicatorSnapshot) -> f64 {
        if snapshot.price <= 0.0 {
            return self.threshold_pct;
        }
        let atr_pct = snapshot.atr.unwrap_or(0.0) / snapshot.price * 100.0;
        if atr_pct.is_finite() {
            self.threshold_pct.max(atr_pct)
        } else {
            self.threshold_pct
        }
    }

    /// Label for the candle at `index`, comparing its close with the close at
    /// `index + 1 + lookahead`. `None` while that candle does not exist yet
    pub fn label(
        &self,
        series: &[Candle],
        index: usize,
        snapshot: &IndicatorSnapshot,
    ) -> Option<Label> {
        let future = series.get(index.checked_add(self.lookahead + 1)?)?;
        let price = snapshot.price;
        if price <= 0.0 {
            return None;
        }

        let move_pct = (future.close - price) / price * 100.0;
        let threshold = self.threshold_pct(snapshot);
        let class = if move_pct > threshold {
            SignalType::Long
        } else if move_pct < -threshold {
            SignalType::Short
        } else {
            SignalType::Wait
        };

        let atr = snapshot.atr_or_floor();
        Some(Label {
            class,
            entry_delta: 0.0,
            tp_delta: (future.close - price).abs() / atr,
            sl_delta: price * TARGET_STOP_FRACTION / atr,
        })
    }
}
