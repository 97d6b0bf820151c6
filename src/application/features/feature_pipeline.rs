use crate::application::features::embeddings::EmbeddingTable;
use crate::application::features::indicators::IndicatorProvider;
use crate::domain::errors::FeatureError;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ml::FeatureWindow;
use crate::domain::ml::feature_registry::{FEATURE_NAMES, IndicatorSnapshot, features_to_vector};
use std::sync::Arc;

/// A feature window together with the raw indicators at its last row
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedWindow {
    pub rows: FeatureWindow,
    pub snapshot: IndicatorSnapshot,
}

/// Builds fixed-width feature vectors: normalised indicators followed by the
/// symbol, pair and timeframe embeddings.
pub struct FeaturePipeline {
    indicators: Arc<dyn IndicatorProvider>,
    embeddings: Arc<EmbeddingTable>,
}

impl FeaturePipeline {
    pub fn new(indicators: Arc<dyn IndicatorProvider>, embeddings: Arc<EmbeddingTable>) -> Self {
        Self {
            indicators,
            embeddings,
        }
    }

    /// Width of every feature vector
    pub fn width(&self) -> usize {
        FEATURE_NAMES.len() + 3 * self.embeddings.dim()
    }

    pub fn indicators(&self) -> &Arc<dyn IndicatorProvider> {
        &self.indicators
    }

    fn identity(&self, key: &SeriesKey) -> Vec<f64> {
        let mut identity = self.embeddings.embedding("symbol", &key.symbol);
        identity.extend(self.embeddings.embedding("pair", &key.pair));
        identity.extend(
            self.embeddings
                .embedding("timeframe", key.timeframe.to_binance_string()),
        );
        identity
    }

    fn to_row(snapshot: &IndicatorSnapshot, identity: &[f64]) -> Vec<f64> {
        let mut row = features_to_vector(snapshot);
        row.extend(identity.iter().map(|v| if v.is_finite() { *v } else { 0.0 }));
        row
    }

    /// One feature row per candle of `series`
    pub fn feature_rows(&self, key: &SeriesKey, series: &[Candle]) -> Vec<Vec<f64>> {
        let identity = self.identity(key);
        self.indicators
            .snapshots(series)
            .iter()
            .map(|s| Self::to_row(s, &identity))
            .collect()
    }

    /// Feature vector of the sub-series ending at `index` (inclusive)
    pub fn compute_feature_vector(
        &self,
        key: &SeriesKey,
        series: &[Candle],
        index: usize,
    ) -> Result<Vec<f64>, FeatureError> {
        if index >= series.len() {
            return Err(FeatureError::InsufficientData {
                required: index + 1,
                available: series.len(),
            });
        }
        let identity = self.identity(key);
        self.indicators
            .latest(&series[..=index])
            .map(|s| Self::to_row(&s, &identity))
            .ok_or(FeatureError::InsufficientData {
                required: 1,
                available: 0,
            })
    }

    /// `window_size` consecutive rows ending at `index` (inclusive), oldest first
    pub fn compute_window(
        &self,
        key: &SeriesKey,
        series: &[Candle],
        index: usize,
        window_size: usize,
    ) -> Result<FeaturedWindow, FeatureError> {
        let available = if index < series.len() { index + 1 } else { series.len() };
        if window_size == 0 || index >= series.len() || available < window_size {
            return Err(FeatureError::InsufficientData {
                required: window_size.max(1),
                available,
            });
        }

        let identity = self.identity(key);
        let snapshots = self.indicators.snapshots(&series[..=index]);
        let start = snapshots.len() - window_size;
        let rows = snapshots[start..]
            .iter()
            .map(|s| Self::to_row(s, &identity))
            .collect();
        let snapshot = snapshots
            .last()
            .cloned()
            .ok_or(FeatureError::InsufficientData {
                required: window_size,
                available: 0,
            })?;
        Ok(FeaturedWindow { rows, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::features::indicators::TaIndicatorProvider;
    use crate::domain::market::Timeframe;
    use crate::infrastructure::mock::MockMarketDataFeed;

    fn pipeline() -> FeaturePipeline {
        FeaturePipeline::new(
            Arc::new(TaIndicatorProvider::default()),
            Arc::new(EmbeddingTable::new(4)),
        )
    }

    fn key() -> SeriesKey {
        SeriesKey::new("ADA", "USDT", Timeframe::OneHour)
    }

    #[test]
    fn test_window_shape() {
        let series = MockMarketDataFeed::trending_series(60, 1.0, 0.01);
        let p = pipeline();
        let window = p.compute_window(&key(), &series, 59, 5).unwrap();
        assert_eq!(window.rows.len(), 5);
        assert!(window.rows.iter().all(|r| r.len() == p.width()));
        assert_eq!(p.width(), 24);
        assert_eq!(window.snapshot.price, series[59].close);
    }

    #[test]
    fn test_window_ends_at_index() {
        let series = MockMarketDataFeed::oscillating_series(80, 10.0, 1.0);
        let p = pipeline();
        let window = p.compute_window(&key(), &series, 70, 3).unwrap();
        let last = p.compute_feature_vector(&key(), &series, 70).unwrap();
        let first = p.compute_feature_vector(&key(), &series, 68).unwrap();
        assert_eq!(window.rows[2], last);
        assert_eq!(window.rows[0], first);
    }

    #[test]
    fn test_insufficient_data() {
        let series = MockMarketDataFeed::trending_series(10, 1.0, 0.01);
        let p = pipeline();
        assert_eq!(
            p.compute_window(&key(), &series, 2, 5),
            Err(FeatureError::InsufficientData {
                required: 5,
                available: 3
            })
        );
        assert!(p.compute_window(&key(), &series, 10, 5).is_err());
        assert!(p.compute_window(&key(), &series, 4, 5).is_ok());
    }

    #[test]
    fn test_rows_are_finite_during_warmup() {
        let series = MockMarketDataFeed::trending_series(8, 1.0, 0.01);
        let rows = pipeline().feature_rows(&key(), &series);
        assert_eq!(rows.len(), 8);
        assert!(rows.iter().flatten().all(|v| v.is_finite()));
    }
}
