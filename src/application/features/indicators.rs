use crate::domain::market::Candle;
use crate::domain::ml::feature_registry::IndicatorSnapshot;
use anyhow::{Result, anyhow};
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, FastStochastic, Maximum, Minimum,
    MovingAverageConvergenceDivergence, OnBalanceVolume, RelativeStrengthIndex,
    SimpleMovingAverage,
};

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Technical indicator values for a candle series
pub trait IndicatorProvider: Send + Sync {
    /// One snapshot per candle, each computed over the candles up to and including it
    fn snapshots(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot>;

    /// Snapshot at the last candle
    fn latest(&self, candles: &[Candle]) -> Option<IndicatorSnapshot> {
        self.snapshots(candles).pop()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPeriods {
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb: usize,
    pub bb_std_dev: f64,
    pub adx: usize,
    pub atr: usize,
    pub stochastic: usize,
    pub ma_short: usize,
    pub ma_long: usize,
    pub volume_ma: usize,
    pub volume_spike_ratio: f64,
    pub ichimoku_conversion: usize,
    pub ichimoku_base: usize,
    pub ichimoku_span: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb: 20,
            bb_std_dev: 2.0,
            adx: 14,
            atr: 14,
            stochastic: 14,
            ma_short: 10,
            ma_long: 50,
            volume_ma: 20,
            volume_spike_ratio: 1.5,
            ichimoku_conversion: 9,
            ichimoku_base: 26,
            ichimoku_span: 52,
        }
    }
}

/// ADX with Wilder's smoothing.
///
/// Accumulates the first N values as a sum, then smooths. Returns `None`
/// until the first DX has been averaged over a full period.
pub struct ManualAdx {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    tr_smooth: f64,
    plus_dm_smooth: f64,
    minus_dm_smooth: f64,
    adx_smooth: f64,
    count: usize,
}

impl ManualAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev: None,
            tr_smooth: 0.0,
            plus_dm_smooth: 0.0,
            minus_dm_smooth: 0.0,
            adx_smooth: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return None;
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        self.count += 1;
        let n = self.period as f64;
        if self.count <= self.period {
            self.tr_smooth += tr;
            self.plus_dm_smooth += plus_dm;
            self.minus_dm_smooth += minus_dm;
        } else {
            self.tr_smooth = self.tr_smooth - (self.tr_smooth / n) + tr;
            self.plus_dm_smooth = self.plus_dm_smooth - (self.plus_dm_smooth / n) + plus_dm;
            self.minus_dm_smooth = self.minus_dm_smooth - (self.minus_dm_smooth / n) + minus_dm;
        }

        if self.count < self.period {
            return None;
        }

        let dx = if self.tr_smooth > 0.0 {
            let plus_di = 100.0 * self.plus_dm_smooth / self.tr_smooth;
            let minus_di = 100.0 * self.minus_dm_smooth / self.tr_smooth;
            let sum_di = plus_di + minus_di;
            if sum_di > 0.0 {
                100.0 * (plus_di - minus_di).abs() / sum_di
            } else {
                0.0
            }
        } else {
            0.0
        };

        if self.count == self.period {
            self.adx_smooth = dx;
        } else {
            self.adx_smooth = ((self.adx_smooth * (n - 1.0)) + dx) / n;
        }

        // ADX is only meaningful once DX has been smoothed over a period
        (self.count >= self.period * 2 - 1).then_some(self.adx_smooth)
    }
}

/// Streaming indicator state over one series
struct IndicatorState {
    periods: IndicatorPeriods,
    count: usize,
    rsi: RelativeStrengthIndex,
    macd: MovingAverageConvergenceDivergence,
    bb: BollingerBands,
    adx: ManualAdx,
    atr: AverageTrueRange,
    stochastic: FastStochastic,
    obv: OnBalanceVolume,
    ma_short: SimpleMovingAverage,
    ma_long: SimpleMovingAverage,
    volume_ma: SimpleMovingAverage,
    conv_high: Maximum,
    conv_low: Minimum,
    base_high: Maximum,
    base_low: Minimum,
    span_high: Maximum,
    span_low: Minimum,
    max_close: f64,
    max_high: f64,
    min_low: f64,
    pv_sum: f64,
    volume_sum: f64,
}

impl IndicatorState {
    fn new(periods: IndicatorPeriods) -> Result<Self> {
        let ta_err = |e| anyhow!("invalid indicator period: {:?}", e);
        Ok(Self {
            periods,
            count: 0,
            rsi: RelativeStrengthIndex::new(periods.rsi).map_err(ta_err)?,
            macd: MovingAverageConvergenceDivergence::new(
                periods.macd_fast,
                periods.macd_slow,
                periods.macd_signal,
            )
            .map_err(ta_err)?,
            bb: BollingerBands::new(periods.bb, periods.bb_std_dev).map_err(ta_err)?,
            adx: ManualAdx::new(periods.adx),
            atr: AverageTrueRange::new(periods.atr).map_err(ta_err)?,
            stochastic: FastStochastic::new(periods.stochastic).map_err(ta_err)?,
            obv: OnBalanceVolume::new(),
            ma_short: SimpleMovingAverage::new(periods.ma_short).map_err(ta_err)?,
            ma_long: SimpleMovingAverage::new(periods.ma_long).map_err(ta_err)?,
            volume_ma: SimpleMovingAverage::new(periods.volume_ma).map_err(ta_err)?,
            conv_high: Maximum::new(periods.ichimoku_conversion).map_err(ta_err)?,
            conv_low: Minimum::new(periods.ichimoku_conversion).map_err(ta_err)?,
            base_high: Maximum::new(periods.ichimoku_base).map_err(ta_err)?,
            base_low: Minimum::new(periods.ichimoku_base).map_err(ta_err)?,
            span_high: Maximum::new(periods.ichimoku_span).map_err(ta_err)?,
            span_low: Minimum::new(periods.ichimoku_span).map_err(ta_err)?,
            max_close: f64::MIN,
            max_high: f64::MIN,
            min_low: f64::MAX,
            pv_sum: 0.0,
            volume_sum: 0.0,
        })
    }

    fn next(&mut self, candle: &Candle) -> IndicatorSnapshot {
        let p = self.periods;
        self.count += 1;
        let n = self.count;
        let warm = |period: usize, value: f64| (n >= period).then_some(value);

        let rsi = self.rsi.next(candle.close);
        let macd = self.macd.next(candle.close);
        let bb = self.bb.next(candle.close);
        let adx = self.adx.next(candle.high, candle.low, candle.close);
        let atr = self.atr.next(candle);
        let stoch = self.stochastic.next(candle);
        let obv = self.obv.next(candle);
        let ma_short = self.ma_short.next(candle.close);
        let ma_long = self.ma_long.next(candle.close);
        let volume_ma = self.volume_ma.next(candle.volume);
        let conv = (self.conv_high.next(candle) + self.conv_low.next(candle)) / 2.0;
        let base = (self.base_high.next(candle) + self.base_low.next(candle)) / 2.0;
        let span_b = (self.span_high.next(candle) + self.span_low.next(candle)) / 2.0;

        self.max_close = self.max_close.max(candle.close);
        self.max_high = self.max_high.max(candle.high);
        self.min_low = self.min_low.min(candle.low);
        self.pv_sum += candle.typical_price() * candle.volume;
        self.volume_sum += candle.volume;

        let vwap = (self.volume_sum > 0.0).then(|| self.pv_sum / self.volume_sum);
        let range = self.max_high - self.min_low;
        let fib = |ratio: f64| Some(self.max_high - range * ratio);
        let volume_ma = warm(p.volume_ma, volume_ma);
        let ichimoku_conversion = warm(p.ichimoku_conversion, conv);
        let ichimoku_base = warm(p.ichimoku_base, base);

        IndicatorSnapshot {
            price: candle.close,
            max_close: self.max_close,
            rsi: warm(p.rsi + 1, rsi),
            adx,
            macd_hist: warm(p.macd_slow + p.macd_signal - 1, macd.histogram),
            bb_middle: warm(p.bb, bb.average),
            stoch_k: warm(p.stochastic, stoch),
            vwap,
            obv: warm(2, obv),
            ichimoku_conversion,
            ichimoku_base,
            ichimoku_span_a: ichimoku_conversion
                .zip(ichimoku_base)
                .map(|(c, b)| (c + b) / 2.0),
            ichimoku_span_b: warm(p.ichimoku_span, span_b),
            fib_382: fib(0.382),
            fib_500: fib(0.5),
            fib_618: fib(0.618),
            ma_short: warm(p.ma_short, ma_short),
            ma_long: warm(p.ma_long, ma_long),
            atr: warm(p.atr + 1, atr),
            volume_spike: volume_ma
                .map(|avg| candle.volume > avg * p.volume_spike_ratio)
                .unwrap_or(false),
            support: self.min_low,
            resistance: self.max_high,
        }
    }
}

/// `IndicatorProvider` backed by the `ta` crate plus manual ADX, VWAP,
/// Ichimoku and Fibonacci computations
#[derive(Debug, Clone, Copy, Default)]
pub struct TaIndicatorProvider {
    periods: IndicatorPeriods,
}

impl TaIndicatorProvider {
    pub fn new(periods: IndicatorPeriods) -> Result<Self> {
        // Fail fast on invalid periods instead of on every series
        IndicatorState::new(periods)?;
        Ok(Self { periods })
    }
}

impl IndicatorProvider for TaIndicatorProvider {
    fn snapshots(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        let mut state = match IndicatorState::new(self.periods) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("TaIndicatorProvider: {}", e);
                return Vec::new();
            }
        };
        candles.iter().map(|c| state.next(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockMarketDataFeed;

    #[test]
    fn test_one_snapshot_per_candle() {
        let candles = MockMarketDataFeed::trending_series(80, 100.0, 0.5);
        let snapshots = TaIndicatorProvider::default().snapshots(&candles);
        assert_eq!(snapshots.len(), 80);
    }

    #[test]
    fn test_warmup_leaves_indicators_empty() {
        let candles = MockMarketDataFeed::trending_series(5, 100.0, 0.5);
        let last = TaIndicatorProvider::default().latest(&candles).unwrap();
        assert!(last.rsi.is_none());
        assert!(last.ma_long.is_none());
        assert!(last.adx.is_none());
        assert!(last.vwap.is_some());
        assert!(last.fib_618.is_some());
    }

    #[test]
    fn test_uptrend_values() {
        let candles = MockMarketDataFeed::trending_series(120, 100.0, 0.5);
        let last = TaIndicatorProvider::default().latest(&candles).unwrap();

        assert!(last.rsi.unwrap() > 70.0);
        assert!(last.ma_short.unwrap() > last.ma_long.unwrap());
        assert!(last.adx.unwrap() > 20.0);
        assert!(last.atr.unwrap() > 0.0);
        assert_eq!(last.max_close, candles[119].close);
        assert_eq!(last.resistance, candles[119].high);
        assert_eq!(last.support, candles[0].low);
        assert!(last.price > last.vwap.unwrap());
    }

    #[test]
    fn test_snapshot_matches_prefix_computation() {
        let candles = MockMarketDataFeed::oscillating_series(90, 50.0, 5.0);
        let provider = TaIndicatorProvider::default();
        let all = provider.snapshots(&candles);
        let prefix = provider.latest(&candles[..60]).unwrap();
        assert_eq!(all[59], prefix);
    }

    #[test]
    fn test_manual_adx_flat_market() {
        let mut adx = ManualAdx::new(3);
        let mut last = None;
        for _ in 0..10 {
            last = adx.next(10.0, 9.0, 9.5);
        }
        assert_eq!(last, Some(0.0));
    }
}
