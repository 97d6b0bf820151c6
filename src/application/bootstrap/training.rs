use crate::application::features::feature_pipeline::FeaturePipeline;
use crate::application::market_data::backfill::BackfillService;
use crate::application::ml::Predictor;
use crate::application::ml::labeler::Labeler;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ml::{FitReport, SharedHyperparams, TrainingSample, read_hyperparams};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Startup training on the full fetched history of a few reference series
pub struct TrainingBootstrap {
    backfill: Arc<BackfillService>,
    pipeline: Arc<FeaturePipeline>,
    predictor: Arc<dyn Predictor>,
    labeler: Labeler,
    hyperparams: SharedHyperparams,
    fetch_limit: usize,
    spacing: Duration,
}

impl TrainingBootstrap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backfill: Arc<BackfillService>,
        pipeline: Arc<FeaturePipeline>,
        predictor: Arc<dyn Predictor>,
        labeler: Labeler,
        hyperparams: SharedHyperparams,
        fetch_limit: usize,
        spacing: Duration,
    ) -> Self {
        Self {
            backfill,
            pipeline,
            predictor,
            labeler,
            hyperparams,
            fetch_limit,
            spacing,
        }
    }

    /// One labelled window per candle that has a complete window behind it
    /// and a look-ahead candle in front of it
    pub fn samples(&self, key: &SeriesKey, series: &[Candle]) -> Vec<TrainingSample> {
        let window_size = read_hyperparams(&self.hyperparams).window_size;
        if window_size == 0 {
            return Vec::new();
        }
        let rows = self.pipeline.feature_rows(key, series);
        let snapshots = self.pipeline.indicators().snapshots(series);

        let mut samples = Vec::new();
        for index in (window_size - 1)..rows.len().min(snapshots.len()) {
            let Some(label) = self.labeler.label(series, index, &snapshots[index]) else {
                break;
            };
            samples.push(TrainingSample {
                window: rows[index + 1 - window_size..=index].to_vec(),
                label,
            });
        }
        samples
    }

    /// Trains on every configured series in turn. A failing series is logged
    /// and skipped. Returns the fit reports that succeeded.
    ///
    /// In-sample accuracy stays out of the training controller; only online
    /// fits move the stability decision.
    pub async fn run(&self, pairs: &[SeriesKey]) -> Vec<FitReport> {
        let mut reports = Vec::new();
        for (i, key) in pairs.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.spacing).await;
            }

            let series = match self.backfill.fetch_recent(key, self.fetch_limit).await {
                Ok(series) => series,
                Err(e) => {
                    warn!("TrainingBootstrap [{}]: Fetch failed: {}", key, e);
                    continue;
                }
            };

            let samples = self.samples(key, &series);
            if samples.is_empty() {
                warn!(
                    "TrainingBootstrap [{}]: Not enough history ({} candles)",
                    key,
                    series.len()
                );
                continue;
            }

            match self.predictor.fit(&samples) {
                Ok(report) => {
                    info!(
                        "TrainingBootstrap [{}]: Trained on {} windows (loss {:.4}, accuracy {:.2})",
                        key, report.samples, report.loss, report.accuracy
                    );
                    reports.push(report);
                }
                Err(e) => warn!("TrainingBootstrap [{}]: Fit failed: {}", key, e),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alerts::AdminAlerter;
    use crate::application::features::embeddings::EmbeddingTable;
    use crate::application::features::indicators::TaIndicatorProvider;
    use crate::application::market_data::candle_cache::CandleCache;
    use crate::application::ml::softmax_predictor::SoftmaxPredictor;
    use crate::domain::market::Timeframe;
    use crate::domain::ml::HyperparamConfig;
    use crate::infrastructure::mock::{MockMarketDataFeed, RecordingNotifier};
    use std::sync::RwLock;

    fn bootstrap(feed: Arc<MockMarketDataFeed>) -> TrainingBootstrap {
        let cache = Arc::new(CandleCache::default());
        let backfill = Arc::new(BackfillService::new(
            feed,
            cache,
            AdminAlerter::new(Arc::new(RecordingNotifier::new()), None),
            3,
        ));
        let hyperparams = Arc::new(RwLock::new(HyperparamConfig {
            window_size: 3,
            units: 8,
            epochs: 2,
        }));
        let pipeline = Arc::new(FeaturePipeline::new(
            Arc::new(TaIndicatorProvider::default()),
            Arc::new(EmbeddingTable::new(4)),
        ));
        let predictor = Arc::new(SoftmaxPredictor::with_seed(hyperparams.clone(), 0.01, 9));
        TrainingBootstrap::new(
            backfill,
            pipeline,
            predictor,
            Labeler::new(10, 1.5),
            hyperparams,
            500,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_samples_stop_at_lookahead() {
        let feed = Arc::new(MockMarketDataFeed::new());
        let trainer = bootstrap(feed);
        let key = SeriesKey::new("BTC", "USDT", Timeframe::OneHour);
        let series = MockMarketDataFeed::trending_series(60, 100.0, 1.0);

        let samples = trainer.samples(&key, &series);
        // indices 2..=48 have both a full window and a candle 11 ahead
        assert_eq!(samples.len(), 47);
        assert!(samples.iter().all(|s| s.window.len() == 3));
    }

    #[tokio::test]
    async fn test_run_skips_failures() {
        let feed = Arc::new(MockMarketDataFeed::new());
        let btc = SeriesKey::new("BTC", "USDT", Timeframe::OneHour);
        let ada = SeriesKey::new("ADA", "USDT", Timeframe::OneHour);
        feed.set_series(&btc, MockMarketDataFeed::trending_series(80, 100.0, 1.0));

        let trainer = bootstrap(feed);

        // ADA has no mock data, so its fetch fails and it is skipped
        let reports = trainer.run(&[btc, ada]).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].samples > 0);
    }
}
