use crate::application::features::feature_pipeline::FeaturePipeline;
use crate::application::market_data::backfill::BackfillService;
use crate::application::market_data::candle_cache::CandleCache;
use crate::application::ml::Predictor;
use crate::application::signals::deduplicator::SignalDeduplicator;
use crate::application::signals::formatter;
use crate::application::signals::signal_generator::SignalGenerator;
use crate::application::simulation::trade_outcome::TradeOutcomeEvaluator;
use crate::domain::errors::CommandError;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ml::feature_registry::IndicatorSnapshot;
use crate::domain::ml::{Prediction, SharedHyperparams, read_hyperparams};
use crate::domain::ports::NotificationChannel;
use crate::domain::repositories::SignalRepository;
use crate::domain::signals::{ExitReason, SignalRecord, TradeOutcome, TradeSignal};
use crate::domain::watch::WatchConfig;
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trailing windows whose predictions are averaged into one call
const SMOOTHING_WINDOWS: usize = 3;

/// Result of analysing the latest candles of a series
#[derive(Debug, Clone)]
pub struct Analysis {
    pub key: SeriesKey,
    pub signal: TradeSignal,
    pub prediction: Prediction,
    pub snapshot: IndicatorSnapshot,
    pub candles: usize,
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub fetch_limit: usize,
    pub confidence_threshold: u8,
    /// Candles after a signal before an untouched trade is closed at market
    pub outcome_horizon: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 200,
            confidence_threshold: 70,
            outcome_horizon: 10,
        }
    }
}

/// Live analysis: on-demand reports, watched-config checks and resolution of
/// pending signal outcomes
pub struct AnalysisService {
    backfill: Arc<BackfillService>,
    cache: Arc<CandleCache>,
    pipeline: Arc<FeaturePipeline>,
    predictor: Arc<dyn Predictor>,
    deduplicator: Arc<SignalDeduplicator>,
    signals: Arc<dyn SignalRepository>,
    notifier: Arc<dyn NotificationChannel>,
    hyperparams: SharedHyperparams,
    generator: SignalGenerator,
    evaluator: TradeOutcomeEvaluator,
    settings: AnalysisSettings,
    metrics: Option<Metrics>,
}

impl AnalysisService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backfill: Arc<BackfillService>,
        cache: Arc<CandleCache>,
        pipeline: Arc<FeaturePipeline>,
        predictor: Arc<dyn Predictor>,
        deduplicator: Arc<SignalDeduplicator>,
        signals: Arc<dyn SignalRepository>,
        notifier: Arc<dyn NotificationChannel>,
        hyperparams: SharedHyperparams,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            backfill,
            cache,
            pipeline,
            predictor,
            deduplicator,
            signals,
            notifier,
            hyperparams,
            generator: SignalGenerator::default(),
            evaluator: TradeOutcomeEvaluator,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn deduplicator(&self) -> &Arc<SignalDeduplicator> {
        &self.deduplicator
    }

    /// Fresh candles for `key`; falls back to the cached series when the
    /// fetch fails but enough history is cached
    async fn load_series(&self, key: &SeriesKey, required: usize) -> Result<Vec<Candle>> {
        match self.backfill.fetch_recent(key, self.settings.fetch_limit).await {
            Ok(series) => Ok(series),
            Err(e) => {
                let cached = self.cache.snapshot(key);
                if cached.len() >= required {
                    warn!(
                        "AnalysisService [{}]: Fetch failed ({}), using {} cached candles",
                        key,
                        e,
                        cached.len()
                    );
                    Ok(cached)
                } else {
                    Err(anyhow!(e)).with_context(|| format!("Failed to load candles for {}", key))
                }
            }
        }
    }

    /// Predicts on the latest candle of `key` and derives a signal
    pub async fn analyze(&self, key: &SeriesKey) -> Result<Analysis, CommandError> {
        let window_size = read_hyperparams(&self.hyperparams).window_size.max(1);
        let series = self.load_series(key, window_size).await?;
        let Some(last) = series.len().checked_sub(1) else {
            return Err(CommandError::Internal(anyhow!("No candles for {}", key)));
        };

        let latest = self
            .pipeline
            .compute_window(key, &series, last, window_size)
            .map_err(|source| CommandError::InsufficientData {
                key: key.to_string(),
                source,
            })?;

        let mut predictions = Vec::with_capacity(SMOOTHING_WINDOWS);
        for offset in 0..SMOOTHING_WINDOWS {
            let Some(index) = last.checked_sub(offset) else {
                break;
            };
            let rows = if offset == 0 {
                latest.rows.clone()
            } else {
                match self.pipeline.compute_window(key, &series, index, window_size) {
                    Ok(window) => window.rows,
                    Err(_) => break,
                }
            };
            let prediction = self
                .predictor
                .predict(&rows)
                .map_err(|e| CommandError::Internal(anyhow!(e)))?;
            predictions.push(prediction);
        }
        let prediction = Prediction::average(&predictions)
            .ok_or_else(|| CommandError::Internal(anyhow!("No prediction for {}", key)))?;

        let signal = self
            .generator
            .derive(&prediction, &latest.snapshot, series[last].timestamp);
        debug!(
            "AnalysisService [{}]: {} ({}%) at {:.6}",
            key, signal.signal_type, signal.confidence, signal.price
        );

        Ok(Analysis {
            key: key.clone(),
            signal,
            prediction,
            snapshot: latest.snapshot,
            candles: series.len(),
        })
    }

    /// Outcome of `record` against the cached candles, `None` while neither
    /// level was touched and the horizon has not elapsed
    fn outcome_for(&self, record: &SignalRecord, candles: &[Candle]) -> Option<TradeOutcome> {
        let levels = record.levels();
        let after = candles.iter().filter(|c| c.timestamp > record.timestamp).count();
        let outcome =
            self.evaluator
                .evaluate(record.signal_type, &levels, record.timestamp, candles)?;
        if outcome.exit_reason == ExitReason::LastClose && after < self.settings.outcome_horizon {
            return None;
        }
        Some(outcome)
    }

    /// Analyses one watched config and emits its signal when the
    /// deduplicator lets it through. Returns the persisted record.
    pub async fn check_watch(&self, config: &WatchConfig, now_ms: i64) -> Result<Option<SignalRecord>> {
        let analysis = self
            .analyze(&config.series)
            .await
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Analysis failed for {}", config.key()))?;

        let key = config.key();
        if !self.deduplicator.should_emit(
            &key,
            &analysis.signal,
            self.settings.confidence_threshold,
            now_ms,
        ) {
            return Ok(None);
        }

        info!(
            "AnalysisService [{}]: Emitting {} ({}%)",
            key, analysis.signal.signal_type, analysis.signal.confidence
        );
        let text = formatter::format_signal_alert(config, &analysis.signal);
        if let Err(e) = self.notifier.send(config.chat_id, &text).await {
            error!("AnalysisService [{}]: Notification failed: {}", key, e);
            if let Some(m) = &self.metrics {
                m.notifications_failed_total.inc();
            }
        }
        if let Some(m) = &self.metrics {
            m.inc_signals(analysis.signal.signal_type.as_str());
        }

        let mut record = SignalRecord::from_signal(config.chat_id, config.series.clone(), &analysis.signal);
        let candles = self.cache.snapshot(&config.series);
        let outcome = self.outcome_for(&record, &candles);
        record = record.with_outcome(outcome);

        match self.signals.insert(&record).await {
            Ok(id) => record.id = Some(id),
            Err(e) => error!("AnalysisService [{}]: Failed to persist signal: {:#}", key, e),
        }
        Ok(Some(record))
    }

    /// Re-evaluates persisted signals without an outcome. Returns how many
    /// were resolved.
    pub async fn resolve_pending(&self, limit: usize) -> Result<usize> {
        let pending = self
            .signals
            .unresolved(limit)
            .await
            .context("Failed to load unresolved signals")?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut series_cache: HashMap<SeriesKey, Vec<Candle>> = HashMap::new();
        let mut resolved = 0;
        for record in &pending {
            let Some(id) = record.id else {
                continue;
            };
            if !series_cache.contains_key(&record.series) {
                let mut candles = self.cache.snapshot(&record.series);
                let has_newer = candles.last().is_some_and(|c| c.timestamp > record.timestamp);
                if !has_newer {
                    match self
                        .backfill
                        .fetch_recent(&record.series, self.settings.fetch_limit)
                        .await
                    {
                        Ok(fetched) => candles = fetched,
                        Err(e) => {
                            warn!(
                                "AnalysisService [{}]: Cannot resolve pending signals: {}",
                                record.series, e
                            );
                        }
                    }
                }
                series_cache.insert(record.series.clone(), candles);
            }
            let candles = series_cache.get(&record.series).map(Vec::as_slice).unwrap_or(&[]);

            if let Some(outcome) = self.outcome_for(record, candles) {
                match self
                    .signals
                    .update_outcome(id, outcome.exit_price, outcome.profit_pct)
                    .await
                {
                    Ok(()) => {
                        resolved += 1;
                        debug!(
                            "AnalysisService [{}]: Signal {} resolved {:?} {:.2}%",
                            record.series, id, outcome.exit_reason, outcome.profit_pct
                        );
                    }
                    Err(e) => error!("AnalysisService: Failed to store outcome of {}: {:#}", id, e),
                }
            }
        }
        if resolved > 0 {
            info!("AnalysisService: Resolved {} pending signal(s)", resolved);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alerts::AdminAlerter;
    use crate::application::features::embeddings::EmbeddingTable;
    use crate::application::features::indicators::TaIndicatorProvider;
    use crate::domain::errors::PredictorError;
    use crate::domain::market::Timeframe;
    use crate::domain::ml::{FeatureWindow, FitReport, HyperparamConfig, TrainingSample};
    use crate::domain::signals::SignalType;
    use crate::infrastructure::mock::{MockMarketDataFeed, RecordingNotifier};
    use crate::infrastructure::repositories::InMemorySignalRepository;
    use std::sync::RwLock;

    /// Always answers the same prediction
    struct FixedPredictor(Prediction);

    impl Predictor for FixedPredictor {
        fn predict(&self, _window: &FeatureWindow) -> Result<Prediction, PredictorError> {
            Ok(self.0)
        }

        fn fit(&self, _batch: &[TrainingSample]) -> Result<FitReport, PredictorError> {
            Ok(FitReport::default())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Fixture {
        service: AnalysisService,
        feed: Arc<MockMarketDataFeed>,
        notifier: Arc<RecordingNotifier>,
        signals: Arc<InMemorySignalRepository>,
    }

    fn fixture(prediction: Prediction) -> Fixture {
        let feed = Arc::new(MockMarketDataFeed::new());
        let cache = Arc::new(CandleCache::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let backfill = Arc::new(BackfillService::new(
            feed.clone(),
            cache.clone(),
            AdminAlerter::new(notifier.clone(), None),
            3,
        ));
        let signals = Arc::new(InMemorySignalRepository::new());
        let service = AnalysisService::new(
            backfill,
            cache,
            Arc::new(FeaturePipeline::new(
                Arc::new(TaIndicatorProvider::default()),
                Arc::new(EmbeddingTable::new(4)),
            )),
            Arc::new(FixedPredictor(prediction)),
            Arc::new(SignalDeduplicator::new(600_000, 0.5)),
            signals.clone(),
            notifier.clone(),
            Arc::new(RwLock::new(HyperparamConfig::default())),
            AnalysisSettings::default(),
        );
        Fixture {
            service,
            feed,
            notifier,
            signals,
        }
    }

    fn long_prediction() -> Prediction {
        Prediction {
            long_prob: 0.9,
            short_prob: 0.05,
            wait_prob: 0.05,
            entry_delta: 0.0,
            tp_delta: 0.2,
            sl_delta: 0.2,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("BTC", "USDT", Timeframe::OneHour)
    }

    #[tokio::test]
    async fn test_analyze_latest_candle() {
        let f = fixture(long_prediction());
        let series = MockMarketDataFeed::oscillating_series(120, 100.0, 5.0);
        f.feed.set_series(&key(), series.clone());

        let analysis = f.service.analyze(&key()).await.unwrap();
        assert_eq!(analysis.candles, 120);
        assert_eq!(analysis.signal.timestamp, series[119].timestamp);
        assert_eq!(analysis.signal.price, series[119].close);
        assert_eq!(analysis.prediction, long_prediction());
    }

    #[tokio::test]
    async fn test_analyze_without_data_fails() {
        let f = fixture(long_prediction());
        f.feed.set_series(&key(), MockMarketDataFeed::trending_series(3, 1.0, 0.1));
        assert!(matches!(
            f.service.analyze(&key()).await,
            Err(CommandError::InsufficientData { .. })
        ));

        f.feed.fail_next(1);
        let other = SeriesKey::new("ETH", "USDT", Timeframe::OneHour);
        assert!(matches!(
            f.service.analyze(&other).await,
            Err(CommandError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_check_watch_emits_once_and_persists_pending() {
        let f = fixture(long_prediction());
        f.feed.set_series(&key(), MockMarketDataFeed::oscillating_series(120, 100.0, 5.0));
        let config = WatchConfig::new(7, "BTC", "USDT", Timeframe::OneHour);

        let record = f.service.check_watch(&config, 0).await.unwrap().unwrap();
        assert_eq!(record.signal_type, SignalType::Long);
        assert!(record.id.is_some());
        assert!(!record.is_resolved());
        assert_eq!(f.notifier.messages_for(7).len(), 1);

        assert!(f.service.check_watch(&config, 60_000).await.unwrap().is_none());
        assert_eq!(f.signals.recent(7, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_pending_after_stop_loss() {
        let f = fixture(long_prediction());
        let series = MockMarketDataFeed::trending_series(40, 100.0, 1.0);
        f.feed.set_series(&key(), series.clone());

        let record = SignalRecord {
            id: None,
            chat_id: 7,
            series: key(),
            signal_type: SignalType::Long,
            confidence: 80,
            timestamp: series[10].timestamp,
            entry_price: 111.0,
            stop_loss: 108.0,
            take_profit: 200.0,
            exit_price: None,
            profit: None,
        };
        f.signals.insert(&record).await.unwrap();
        // a signal newer than every candle stays pending
        let mut future = record.clone();
        future.timestamp = series[39].timestamp;
        f.signals.insert(&future).await.unwrap();

        // prices only rise, so the take-profit far away is never hit and the
        // trade is closed at the last close after the horizon
        assert_eq!(f.service.resolve_pending(10).await.unwrap(), 1);
        assert_eq!(f.signals.unresolved(10).await.unwrap().len(), 1);
        let closed = f.signals.closed_for_chat(7).await.unwrap();
        assert_eq!(closed[0].exit_price, Some(series[39].close));
    }
}
