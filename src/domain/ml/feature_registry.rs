/// Ordered list of indicator feature names.
/// This order MUST match `features_to_vector`; any change invalidates trained predictor state.
pub const FEATURE_NAMES: &[&str] = &[
    "rsi",
    "adx",
    "macd_hist",
    "volume_spike",
    "ma_spread",
    "bb_middle_distance",
    "stoch_k",
    "vwap_distance",
    "obv",
    "ichimoku_spread",
    "fib_618_distance",
    "atr",
];

/// Raw indicator values at one point of a series.
///
/// `None` means the indicator had not warmed up yet at that index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub price: f64,
    /// Maximum close over the sub-series, used as the price scale
    pub max_close: f64,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_middle: Option<f64>,
    pub stoch_k: Option<f64>,
    pub vwap: Option<f64>,
    pub obv: Option<f64>,
    pub ichimoku_conversion: Option<f64>,
    pub ichimoku_base: Option<f64>,
    pub ichimoku_span_a: Option<f64>,
    pub ichimoku_span_b: Option<f64>,
    pub fib_382: Option<f64>,
    pub fib_500: Option<f64>,
    pub fib_618: Option<f64>,
    pub ma_short: Option<f64>,
    pub ma_long: Option<f64>,
    pub atr: Option<f64>,
    pub volume_spike: bool,
    pub support: f64,
    pub resistance: f64,
}

impl IndicatorSnapshot {
    /// ATR with a tiny floor so ATR-scaled levels never collapse to the price
    pub fn atr_or_floor(&self) -> f64 {
        match self.atr {
            Some(atr) if atr.is_finite() && atr > 0.0 => atr,
            _ => 0.0001,
        }
    }
}

/// Normalises a snapshot into the fixed-order indicator vector.
///
/// Oscillators are divided by 100, price-like values by the local maximum
/// close, OBV by 1e6. Missing or non-finite values become 0, except RSI and
/// stochastic %K which default to their neutral 50.
pub fn features_to_vector(snapshot: &IndicatorSnapshot) -> Vec<f64> {
    let scale = if snapshot.max_close > 0.0 {
        snapshot.max_close
    } else {
        1.0
    };
    let price = snapshot.price;
    let distance = |level: Option<f64>| level.map(|l| (price - l) / scale);
    let spread = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(a), Some(b)) => Some((a - b) / scale),
        _ => None,
    };

    let raw = [
        Some(snapshot.rsi.unwrap_or(50.0) / 100.0),
        snapshot.adx.map(|v| v / 100.0),
        snapshot.macd_hist.map(|v| v / scale),
        Some(if snapshot.volume_spike { 1.0 } else { 0.0 }),
        spread(snapshot.ma_short, snapshot.ma_long),
        distance(snapshot.bb_middle),
        Some(snapshot.stoch_k.unwrap_or(50.0) / 100.0),
        distance(snapshot.vwap),
        snapshot.obv.map(|v| v / 1e6),
        spread(snapshot.ichimoku_conversion, snapshot.ichimoku_base),
        distance(snapshot.fib_618),
        snapshot.atr.map(|v| v / scale),
    ];

    raw.iter()
        .map(|v| match v {
            Some(x) if x.is_finite() => *x,
            _ => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_length() {
        let vec = features_to_vector(&IndicatorSnapshot::default());
        assert_eq!(vec.len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_defaults_for_missing_values() {
        let vec = features_to_vector(&IndicatorSnapshot::default());
        assert_eq!(vec[0], 0.5); // rsi neutral
        assert_eq!(vec[6], 0.5); // stoch neutral
        assert!(vec.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_nan_replaced_by_zero() {
        let snapshot = IndicatorSnapshot {
            price: 100.0,
            max_close: 120.0,
            adx: Some(f64::NAN),
            obv: Some(f64::INFINITY),
            vwap: Some(90.0),
            ..Default::default()
        };
        let vec = features_to_vector(&snapshot);
        assert_eq!(vec[1], 0.0);
        assert_eq!(vec[8], 0.0);
        assert!((vec[7] - 10.0 / 120.0).abs() < 1e-12);
    }
}
