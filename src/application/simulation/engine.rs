use crate::application::features::feature_pipeline::FeaturePipeline;
use crate::application::market_data::backfill::BackfillService;
use crate::application::market_data::candle_cache::CandleCache;
use crate::application::ml::labeler::Labeler;
use crate::application::ml::online_trainer::OnlineTrainer;
use crate::application::signals::signal_generator::SignalGenerator;
use crate::application::simulation::trade_outcome::TradeOutcomeEvaluator;
use crate::domain::errors::FeatureError;
use crate::domain::market::Candle;
use crate::domain::ml::{SharedHyperparams, TrainingSample, read_hyperparams};
use crate::domain::repositories::WatchConfigRepository;
use crate::domain::signals::{ExitReason, TradeOutcome};
use crate::domain::watch::{ConfigKey, WatchConfig};
use crate::infrastructure::observability::Metrics;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing and sizing of the simulation loops
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub step_interval: Duration,
    pub retry_interval: Duration,
    /// Delay between the first steps of configs started together
    pub start_spacing: Duration,
    /// Candles fetched when the cached series is too short to label
    pub fetch_limit: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(1000),
            retry_interval: Duration::from_millis(30_000),
            start_spacing: Duration::from_millis(1000),
            fetch_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Idle,
    Stepping,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Cursor reached the end of the series or simulation is disabled
    Halted,
    /// Not enough history before the cursor; cursor advanced
    Skipped,
    /// Prediction made (and possibly trained on); cursor advanced
    Advanced,
    /// Predictor failed; cursor advanced past the step
    Abandoned,
    /// Transient failure; cursor kept for a retry
    Failed,
}

/// Per-config tally of simulated trades
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimStats {
    pub steps: u64,
    pub signals: u64,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_profit_pct: f64,
}

impl SimStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64 * 100.0
    }

    pub fn avg_profit_pct(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.total_profit_pct / self.trades as f64
    }

    fn record(&mut self, outcome: &TradeOutcome) {
        self.trades += 1;
        if outcome.profit_pct > 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.total_profit_pct += outcome.profit_pct;
    }
}

/// Position of a simulation within its series.
///
/// Anchored on a candle timestamp rather than an index so that FIFO eviction
/// in the cache does not shift it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing stepped yet; begins at the first full window
    Start,
    /// Every candle up to and including this timestamp has been stepped
    After(i64),
}

impl Cursor {
    /// Index of the next candle to reveal in `series`
    fn resolve(self, series: &[Candle], window_size: usize) -> usize {
        match self {
            Cursor::Start => window_size,
            Cursor::After(ts) => series
                .partition_point(|c| c.timestamp <= ts)
                .max(window_size),
        }
    }
}

struct SimEntry {
    config: WatchConfig,
    cursor: Option<Cursor>,
    phase: SimulationPhase,
    cancel: CancellationToken,
    generation: u64,
    stats: SimStats,
}

/// Walks each watched series candle by candle, predicting at every cursor and
/// feeding realized labels back into the trainer.
///
/// One stepping task per config at most. Starting an already stepping config
/// is a no-op; stopping cancels its task.
#[derive(Clone)]
pub struct SimulationEngine {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<CandleCache>,
    backfill: Arc<BackfillService>,
    pipeline: Arc<FeaturePipeline>,
    trainer: Arc<OnlineTrainer>,
    watch_repository: Arc<dyn WatchConfigRepository>,
    generator: SignalGenerator,
    evaluator: TradeOutcomeEvaluator,
    labeler: Labeler,
    hyperparams: SharedHyperparams,
    settings: SimulationSettings,
    entries: Mutex<HashMap<ConfigKey, SimEntry>>,
    /// Last candle stepped per config, reused by the next start
    saved_cursors: Mutex<HashMap<ConfigKey, i64>>,
    next_generation: Mutex<u64>,
    metrics: Option<Metrics>,
}

impl SimulationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<CandleCache>,
        backfill: Arc<BackfillService>,
        pipeline: Arc<FeaturePipeline>,
        trainer: Arc<OnlineTrainer>,
        watch_repository: Arc<dyn WatchConfigRepository>,
        labeler: Labeler,
        hyperparams: SharedHyperparams,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                backfill,
                pipeline,
                trainer,
                watch_repository,
                generator: SignalGenerator::default(),
                evaluator: TradeOutcomeEvaluator,
                labeler,
                hyperparams,
                settings,
                entries: Mutex::new(HashMap::new()),
                saved_cursors: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
                metrics: None,
            }),
        }
    }

    /// Must be called before the engine is cloned
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = Some(metrics);
        }
        self
    }

    /// Starts the stepping loop for `config`. Returns false when it is
    /// already stepping.
    pub fn start(&self, config: &WatchConfig) -> bool {
        self.start_after(config, Duration::ZERO)
    }

    fn start_after(&self, config: &WatchConfig, initial_delay: Duration) -> bool {
        let Some((key, cancel, generation)) = self.inner.arm(config) else {
            return false;
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            Inner::step_loop(inner, key, cancel, generation, initial_delay).await;
        });
        self.inner.update_gauge();
        true
    }

    /// Starts every persisted config that is not already stepping, spacing
    /// their first steps. Returns how many loops were started.
    pub async fn start_all(&self) -> Result<usize> {
        let configs = self.inner.watch_repository.load_all().await?;
        let mut started = 0;
        for config in &configs {
            let delay = self.inner.settings.start_spacing * started as u32;
            if self.start_after(config, delay) {
                started += 1;
            }
        }
        if started > 0 {
            info!("SimulationEngine: Started {} simulation loop(s)", started);
        }
        Ok(started)
    }

    /// Cancels the loop for `key` and drops its cursor and statistics
    pub fn stop(&self, key: &ConfigKey) -> bool {
        let removed = self.inner.lock().remove(key);
        self.inner.saved().remove(key);
        self.inner.update_gauge();
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!("SimulationEngine [{}]: Stopped", key);
                true
            }
            None => false,
        }
    }

    /// Runs one step for `key` immediately
    pub async fn step(&self, key: &ConfigKey) -> StepOutcome {
        self.inner.step(key, None).await
    }

    pub fn is_active(&self, key: &ConfigKey) -> bool {
        self.phase(key) == SimulationPhase::Stepping
    }

    pub fn phase(&self, key: &ConfigKey) -> SimulationPhase {
        self.inner
            .lock()
            .get(key)
            .map(|e| e.phase)
            .unwrap_or(SimulationPhase::Idle)
    }

    /// Cursor index against the currently cached series
    pub fn cursor(&self, key: &ConfigKey) -> Option<usize> {
        let (series_key, cursor) = {
            let entries = self.inner.lock();
            let entry = entries.get(key)?;
            (entry.config.series.clone(), entry.cursor?)
        };
        let window_size = read_hyperparams(&self.inner.hyperparams).window_size.max(1);
        Some(cursor.resolve(&self.inner.cache.snapshot(&series_key), window_size))
    }

    pub fn stats(&self, key: &ConfigKey) -> Option<SimStats> {
        self.inner.lock().get(key).map(|e| e.stats)
    }

    /// Every known config with its statistics, sorted by key
    pub fn all_stats(&self) -> Vec<(WatchConfig, SimStats)> {
        let entries = self.inner.lock();
        let mut all: Vec<(ConfigKey, WatchConfig, SimStats)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.config.clone(), e.stats))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.into_iter().map(|(_, c, s)| (c, s)).collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    /// Cancels every loop, e.g. on shutdown
    pub fn shutdown(&self) {
        for entry in self.inner.lock().values_mut() {
            entry.cancel.cancel();
            entry.phase = SimulationPhase::Halted;
        }
        self.inner.update_gauge();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<ConfigKey, SimEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn saved(&self) -> MutexGuard<'_, HashMap<ConfigKey, i64>> {
        match self.saved_cursors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_generation(&self) -> u64 {
        let mut next = match self.next_generation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *next += 1;
        *next
    }

    fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| e.phase == SimulationPhase::Stepping)
            .count()
    }

    fn update_gauge(&self) {
        if let Some(m) = &self.metrics {
            m.active_simulations.set(self.active_count() as f64);
        }
    }

    /// Marks `config` as stepping with its saved (or initial) cursor.
    /// `None` when it already steps.
    fn arm(&self, config: &WatchConfig) -> Option<(ConfigKey, CancellationToken, u64)> {
        let key = config.key();
        let cursor = self
            .saved()
            .get(&key)
            .map_or(Cursor::Start, |ts| Cursor::After(*ts));
        let generation = self.next_generation();
        let cancel = CancellationToken::new();

        let mut entries = self.lock();
        match entries.get_mut(&key) {
            Some(entry) if entry.phase == SimulationPhase::Stepping => {
                debug!("SimulationEngine [{}]: Already stepping", key);
                return None;
            }
            Some(entry) => {
                entry.cursor = Some(cursor);
                entry.phase = SimulationPhase::Stepping;
                entry.cancel = cancel.clone();
                entry.generation = generation;
            }
            None => {
                entries.insert(
                    key.clone(),
                    SimEntry {
                        config: config.clone(),
                        cursor: Some(cursor),
                        phase: SimulationPhase::Stepping,
                        cancel: cancel.clone(),
                        generation,
                        stats: SimStats::default(),
                    },
                );
            }
        }
        info!("SimulationEngine [{}]: Armed at {:?}", key, cursor);
        Some((key, cancel, generation))
    }

    async fn step_loop(
        inner: Arc<Inner>,
        key: ConfigKey,
        cancel: CancellationToken,
        generation: u64,
        initial_delay: Duration,
    ) {
        if !initial_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let delay = match inner.step(&key, Some(generation)).await {
                StepOutcome::Halted => break,
                StepOutcome::Failed => inner.settings.retry_interval,
                _ => inner.settings.step_interval,
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("SimulationEngine [{}]: Loop exited", key);
    }

    /// Halts the entry and discards its cursor
    fn halt(&self, key: &ConfigKey, generation: Option<u64>, reason: &str) -> StepOutcome {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key)
            && generation.is_none_or(|g| g == entry.generation)
        {
            entry.phase = SimulationPhase::Halted;
            entry.cursor = None;
            entry.cancel.cancel();
        }
        drop(entries);
        self.saved().remove(key);
        self.update_gauge();
        info!("SimulationEngine [{}]: Halted ({})", key, reason);
        self.count("halted");
        StepOutcome::Halted
    }

    /// Moves the cursor past the candle at `revealed` when the entry still
    /// belongs to `generation`
    fn advance(
        &self,
        key: &ConfigKey,
        generation: Option<u64>,
        revealed: i64,
        stats: Option<SimStats>,
    ) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if generation.is_some_and(|g| g != entry.generation) || entry.cursor.is_none() {
            return;
        }
        entry.cursor = Some(Cursor::After(revealed));
        if let Some(stats) = stats {
            entry.stats = stats;
        }
        drop(entries);
        self.saved().insert(key.clone(), revealed);
    }

    fn count(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.inc_simulation_step(outcome);
        }
    }

    async fn step(&self, key: &ConfigKey, generation: Option<u64>) -> StepOutcome {
        let (config, cursor, mut stats) = {
            let entries = self.lock();
            let Some(entry) = entries.get(key) else {
                return StepOutcome::Halted;
            };
            if generation.is_some_and(|g| g != entry.generation) {
                return StepOutcome::Halted;
            }
            let (SimulationPhase::Stepping, Some(cursor)) = (entry.phase, entry.cursor) else {
                return StepOutcome::Halted;
            };
            (entry.config.clone(), cursor, entry.stats)
        };

        let controller = self.trainer.controller();
        if !controller.simulation_enabled() {
            return self.halt(key, generation, "simulation disabled");
        }

        let series_key = &config.series;
        let window_size = read_hyperparams(&self.hyperparams).window_size.max(1);
        let mut series = self.cache.snapshot(series_key);
        if series.len() < window_size + self.labeler.lookahead() + 1 {
            match self
                .backfill
                .fetch_recent(series_key, self.settings.fetch_limit)
                .await
            {
                Ok(fetched) => series = fetched,
                Err(e) if series.is_empty() => {
                    warn!("SimulationEngine [{}]: Fetch failed, retrying later: {}", key, e);
                    self.count("failed");
                    return StepOutcome::Failed;
                }
                Err(e) => {
                    debug!(
                        "SimulationEngine [{}]: Backfill failed, stepping {} cached candles: {}",
                        key,
                        series.len(),
                        e
                    );
                }
            }
        }

        let cursor = cursor.resolve(&series, window_size);
        if cursor >= series.len() {
            return self.halt(key, generation, "end of series");
        }
        let revealed = series[cursor].timestamp;

        let index = cursor - 1;
        let window = match self
            .pipeline
            .compute_window(series_key, &series, index, window_size)
        {
            Ok(window) => window,
            Err(FeatureError::InsufficientData {
                required,
                available,
            }) => {
                debug!(
                    "SimulationEngine [{}]: Need {} candles, have {}",
                    key, required, available
                );
                self.advance(key, generation, revealed, None);
                self.count("skipped");
                return StepOutcome::Skipped;
            }
        };

        let predictor = self.trainer.predictor();
        let prediction = match predictor.predict(&window.rows) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("SimulationEngine [{}]: Predict failed at {}: {}", key, cursor, e);
                self.advance(key, generation, revealed, None);
                self.count("abandoned");
                return StepOutcome::Abandoned;
            }
        };

        let signal = self
            .generator
            .derive(&prediction, &window.snapshot, series[index].timestamp);
        stats.steps += 1;
        if signal.signal_type.is_directional() {
            stats.signals += 1;
            let horizon = (cursor + self.labeler.lookahead()).min(series.len());
            // an open trade is only scored once its whole look-ahead has elapsed
            let elapsed = horizon - cursor >= self.labeler.lookahead();
            if let Some(outcome) = self.evaluator.evaluate(
                signal.signal_type,
                &signal.levels,
                signal.timestamp,
                &series[cursor..horizon],
            ) {
                debug!(
                    "SimulationEngine [{}]: {} at {:.6} -> {:?} {:.2}%",
                    key,
                    signal.signal_type,
                    signal.levels.entry,
                    outcome.exit_reason,
                    outcome.profit_pct
                );
                if outcome.exit_reason != ExitReason::LastClose || elapsed {
                    stats.record(&outcome);
                }
            }
        }

        if controller.simulation_enabled()
            && let Some(label) = self.labeler.label(&series, index, &window.snapshot)
        {
            let sample = TrainingSample {
                window: window.rows,
                label,
            };
            if let Err(e) = self.trainer.observe(sample) {
                warn!("SimulationEngine [{}]: Training step abandoned: {}", key, e);
            }
        }

        self.advance(key, generation, revealed, Some(stats));
        self.count("advanced");
        StepOutcome::Advanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alerts::AdminAlerter;
    use crate::application::features::embeddings::EmbeddingTable;
    use crate::application::features::indicators::TaIndicatorProvider;
    use crate::application::market_data::candle_cache::DEFAULT_CACHE_CAPACITY;
    use crate::application::ml::softmax_predictor::SoftmaxPredictor;
    use crate::application::training::training_controller::TrainingController;
    use crate::domain::market::Timeframe;
    use crate::domain::ml::HyperparamConfig;
    use crate::infrastructure::mock::{MockMarketDataFeed, RecordingNotifier};
    use crate::infrastructure::repositories::InMemoryWatchConfigRepository;
    use std::sync::RwLock;

    struct Fixture {
        engine: SimulationEngine,
        feed: Arc<MockMarketDataFeed>,
        cache: Arc<CandleCache>,
        controller: Arc<TrainingController>,
        repo: Arc<InMemoryWatchConfigRepository>,
    }

    fn fixture() -> Fixture {
        fixture_with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    fn fixture_with_capacity(capacity: usize) -> Fixture {
        let feed = Arc::new(MockMarketDataFeed::new());
        let cache = Arc::new(CandleCache::new(capacity));
        let notifier = Arc::new(RecordingNotifier::new());
        let backfill = Arc::new(BackfillService::new(
            feed.clone(),
            cache.clone(),
            AdminAlerter::new(notifier, None),
            3,
        ));
        let hyperparams = Arc::new(RwLock::new(HyperparamConfig {
            window_size: 3,
            units: 8,
            epochs: 1,
        }));
        let pipeline = Arc::new(FeaturePipeline::new(
            Arc::new(TaIndicatorProvider::default()),
            Arc::new(EmbeddingTable::new(4)),
        ));
        let controller = Arc::new(TrainingController::new());
        let predictor = Arc::new(SoftmaxPredictor::with_seed(hyperparams.clone(), 0.01, 5));
        let trainer = Arc::new(OnlineTrainer::new(predictor, controller.clone(), 4));
        let repo = Arc::new(InMemoryWatchConfigRepository::new());
        let engine = SimulationEngine::new(
            cache.clone(),
            backfill,
            pipeline,
            trainer,
            repo.clone(),
            Labeler::new(10, 1.5),
            hyperparams,
            SimulationSettings {
                step_interval: Duration::from_secs(3600),
                retry_interval: Duration::from_secs(3600),
                start_spacing: Duration::from_millis(10),
                fetch_limit: 100,
            },
        );
        Fixture {
            engine,
            feed,
            cache,
            controller,
            repo,
        }
    }

    fn config() -> WatchConfig {
        WatchConfig::new(1, "BTC", "USDT", Timeframe::OneHour)
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_advances_cursor_and_trains() {
        let f = fixture();
        let config = config();
        f.feed.set_series(
            &config.series,
            MockMarketDataFeed::oscillating_series(60, 100.0, 5.0),
        );
        assert!(f.engine.start(&config));
        assert!(!f.engine.start(&config));
        let key = config.key();

        // the spawned loop takes the first step, manual steps follow
        tokio::task::yield_now().await;
        let first = f.engine.cursor(&key).unwrap();
        for _ in 0..20 {
            assert_eq!(f.engine.step(&key).await, StepOutcome::Advanced);
        }
        assert_eq!(f.engine.cursor(&key), Some(first + 20));
        assert!(f.engine.stats(&key).unwrap().steps >= 20);
        assert!(f.controller.training_counter() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halts_at_end_of_series() {
        let f = fixture();
        let config = config();
        f.feed.set_series(
            &config.series,
            MockMarketDataFeed::trending_series(6, 100.0, 1.0),
        );
        f.engine.start(&config);
        let key = config.key();
        tokio::task::yield_now().await;

        let mut outcome = StepOutcome::Advanced;
        for _ in 0..10 {
            outcome = f.engine.step(&key).await;
            if outcome == StepOutcome::Halted {
                break;
            }
        }
        assert_eq!(outcome, StepOutcome::Halted);
        assert!(!f.engine.is_active(&key));
        assert_eq!(f.engine.cursor(&key), None);
        assert_eq!(f.engine.phase(&key), SimulationPhase::Halted);

        // re-arming starts over
        assert!(f.engine.start(&config));
        assert_eq!(f.engine.cursor(&key), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_keeps_cursor() {
        let f = fixture();
        let config = config();
        f.feed.fail_next(10);
        f.engine.start(&config);
        let key = config.key();
        tokio::task::yield_now().await;

        assert_eq!(f.engine.step(&key).await, StepOutcome::Failed);
        assert_eq!(f.engine.cursor(&key), Some(3));
        assert!(f.engine.is_active(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_simulation_halts() {
        let f = fixture();
        for _ in 0..50 {
            f.controller.record_accuracy(0.95);
        }
        f.controller.evaluate().await;
        let config = config();
        f.feed.set_series(
            &config.series,
            MockMarketDataFeed::trending_series(30, 100.0, 1.0),
        );
        f.engine.start(&config);
        assert_eq!(f.engine.step(&config.key()).await, StepOutcome::Halted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_and_stop() {
        let f = fixture();
        let a = config();
        let b = WatchConfig::new(2, "ADA", "USDT", Timeframe::FourHour);
        f.repo.upsert(&a).await.unwrap();
        f.repo.upsert(&b).await.unwrap();
        f.feed.set_series(&a.series, MockMarketDataFeed::trending_series(50, 1.0, 0.01));
        f.feed.set_series(&b.series, MockMarketDataFeed::trending_series(50, 1.0, 0.01));

        assert_eq!(f.engine.start_all().await.unwrap(), 2);
        assert_eq!(f.engine.start_all().await.unwrap(), 0);
        assert_eq!(f.engine.active_count(), 2);

        assert!(f.engine.stop(&a.key()));
        assert!(!f.engine.stop(&a.key()));
        assert_eq!(f.engine.phase(&a.key()), SimulationPhase::Idle);
        assert_eq!(f.engine.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_cached_series_is_backfilled() {
        let f = fixture();
        let config = config();
        let history = MockMarketDataFeed::oscillating_series(60, 100.0, 5.0);
        f.feed.set_series(&config.series, history.clone());
        // only a couple of live candles so far
        f.cache.append_live(&config.series, history[0]);
        f.cache.append_live(&config.series, history[1]);

        f.engine.start(&config);
        let key = config.key();

        assert_ne!(f.engine.step(&key).await, StepOutcome::Halted);
        assert_eq!(f.cache.len(&config.series), 60);
        assert!(f.engine.is_active(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_survives_cache_eviction() {
        let f = fixture_with_capacity(30);
        let config = config();
        let history = MockMarketDataFeed::oscillating_series(40, 100.0, 5.0);
        f.feed.set_series(&config.series, history[..30].to_vec());

        f.engine.start(&config);
        tokio::task::yield_now().await;
        let key = config.key();
        for _ in 0..5 {
            f.engine.step(&key).await;
        }
        let before = f.engine.cursor(&key).unwrap();
        let next_ts = f.cache.snapshot(&config.series)[before].timestamp;

        // five live candles push the five oldest out of the cache
        for candle in &history[30..35] {
            assert!(f.cache.append_live(&config.series, *candle));
        }
        let after = f.engine.cursor(&key).unwrap();
        assert_eq!(after, before - 5);
        assert_eq!(f.cache.snapshot(&config.series)[after].timestamp, next_ts);

        let outcome = f.engine.step(&key).await;
        assert!(!matches!(outcome, StepOutcome::Halted | StepOutcome::Failed));
        let stepped = f.engine.cursor(&key).unwrap();
        assert_eq!(stepped, after + 1);
        assert_eq!(
            f.cache.snapshot(&config.series)[stepped].timestamp,
            next_ts + 3_600_000
        );
    }
}
