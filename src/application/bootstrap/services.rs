use anyhow::{Context, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

use crate::application::alerts::AdminAlerter;
use crate::application::bootstrap::persistence::PersistenceHandle;
use crate::application::bootstrap::training::TrainingBootstrap;
use crate::application::commands::CommandService;
use crate::application::features::embeddings::EmbeddingTable;
use crate::application::features::feature_pipeline::FeaturePipeline;
use crate::application::features::indicators::{IndicatorPeriods, TaIndicatorProvider};
use crate::application::market_data::backfill::BackfillService;
use crate::application::market_data::candle_cache::CandleCache;
use crate::application::market_data::staleness_monitor::StalenessMonitor;
use crate::application::market_data::subscription_manager::StreamSubscriptionManager;
use crate::application::ml::Predictor;
use crate::application::ml::labeler::Labeler;
use crate::application::ml::online_trainer::OnlineTrainer;
use crate::application::ml::softmax_predictor::SoftmaxPredictor;
use crate::application::signals::analysis_service::{AnalysisService, AnalysisSettings};
use crate::application::signals::deduplicator::SignalDeduplicator;
use crate::application::simulation::engine::{SimulationEngine, SimulationSettings};
use crate::application::training::training_controller::TrainingController;
use crate::config::Config;
use crate::domain::ml::SharedHyperparams;
use crate::domain::ports::{KlineStreamConnector, MarketDataFeed, NotificationChannel};
use crate::infrastructure::observability::Metrics;

/// Pause between bootstrap training series
const BOOTSTRAP_SPACING: Duration = Duration::from_secs(1);

/// External capabilities the core is wired against
#[derive(Clone)]
pub struct Ports {
    pub feed: Arc<dyn MarketDataFeed>,
    pub connector: Arc<dyn KlineStreamConnector>,
    pub notifier: Arc<dyn NotificationChannel>,
}

#[derive(Clone)]
pub struct ServicesHandle {
    pub alerts: AdminAlerter,
    pub cache: Arc<CandleCache>,
    pub backfill: Arc<BackfillService>,
    pub subscriptions: StreamSubscriptionManager,
    pub pipeline: Arc<FeaturePipeline>,
    pub hyperparams: SharedHyperparams,
    pub predictor: Arc<dyn Predictor>,
    pub controller: Arc<TrainingController>,
    pub trainer: Arc<OnlineTrainer>,
    pub engine: SimulationEngine,
    pub deduplicator: Arc<SignalDeduplicator>,
    pub analysis: Arc<AnalysisService>,
    pub commands: Arc<CommandService>,
    pub training_bootstrap: Arc<TrainingBootstrap>,
}

impl ServicesHandle {
    pub fn staleness_monitor(&self, config: &Config) -> StalenessMonitor {
        StalenessMonitor::new(
            self.subscriptions.clone(),
            self.backfill.clone(),
            config.stream.staleness_check(),
            config.stream.staleness_threshold(),
            config.stream.fallback_fetch_limit,
        )
    }
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub fn init(
        config: &Config,
        ports: Ports,
        persistence: &PersistenceHandle,
        metrics: &Metrics,
    ) -> Result<ServicesHandle> {
        let alerts = AdminAlerter::new(ports.notifier.clone(), config.notifier.admin_chat_id);
        let cache = Arc::new(CandleCache::new(config.stream.cache_capacity));

        let backfill = Arc::new(
            BackfillService::new(
                ports.feed.clone(),
                cache.clone(),
                alerts.clone(),
                config.stream.fallback_max_failures,
            )
            .with_metrics(metrics.clone()),
        );

        let subscriptions = StreamSubscriptionManager::new(
            ports.connector.clone(),
            cache.clone(),
            config.stream.reconnect_delay(),
            config.stream.max_reconnects,
        )
        .with_metrics(metrics.clone());

        let indicators = TaIndicatorProvider::new(IndicatorPeriods::default())
            .context("Failed to build indicator provider")?;
        let pipeline = Arc::new(FeaturePipeline::new(
            Arc::new(indicators),
            Arc::new(EmbeddingTable::new(config.model.embedding_dim)),
        ));

        let hyperparams: SharedHyperparams = Arc::new(RwLock::new(config.model.hyperparams()));
        let predictor: Arc<dyn Predictor> = Arc::new(SoftmaxPredictor::new(
            hyperparams.clone(),
            config.model.learning_rate,
        ));

        let controller = Arc::new(
            TrainingController::new()
                .with_alerts(alerts.clone())
                .with_metrics(metrics.clone()),
        );
        let trainer = Arc::new(
            OnlineTrainer::new(
                predictor.clone(),
                controller.clone(),
                config.simulation.training_batch_size,
            )
            .with_metrics(metrics.clone()),
        );

        let labeler = Labeler::new(
            config.simulation.lookahead_candles,
            config.simulation.label_threshold_pct,
        );

        let engine = SimulationEngine::new(
            cache.clone(),
            backfill.clone(),
            pipeline.clone(),
            trainer.clone(),
            persistence.watch_repository.clone(),
            labeler,
            hyperparams.clone(),
            SimulationSettings {
                step_interval: config.simulation.step_interval(),
                retry_interval: config.simulation.retry_interval(),
                start_spacing: config.simulation.start_spacing(),
                fetch_limit: config.market.fetch_limit,
            },
        )
        .with_metrics(metrics.clone());

        let deduplicator = Arc::new(SignalDeduplicator::new(
            config.signal.cooldown_ms(),
            config.signal.significance_atr,
        ));

        let analysis = Arc::new(
            AnalysisService::new(
                backfill.clone(),
                cache.clone(),
                pipeline.clone(),
                predictor.clone(),
                deduplicator.clone(),
                persistence.signal_repository.clone(),
                ports.notifier.clone(),
                hyperparams.clone(),
                AnalysisSettings {
                    fetch_limit: config.market.fetch_limit,
                    confidence_threshold: config.signal.confidence_threshold,
                    outcome_horizon: config.simulation.lookahead_candles,
                },
            )
            .with_metrics(metrics.clone()),
        );

        let commands = Arc::new(CommandService::new(
            ports.feed.clone(),
            analysis.clone(),
            subscriptions.clone(),
            engine.clone(),
            controller.clone(),
            predictor.clone(),
            persistence.watch_repository.clone(),
            persistence.signal_repository.clone(),
            persistence.settings_repository.clone(),
            hyperparams.clone(),
        ));

        let training_bootstrap = Arc::new(TrainingBootstrap::new(
            backfill.clone(),
            pipeline.clone(),
            predictor.clone(),
            labeler,
            hyperparams.clone(),
            config.market.fetch_limit,
            BOOTSTRAP_SPACING,
        ));

        info!(
            "Services initialized (model {}, window {}, feature width {})",
            predictor.name(),
            config.model.window_size,
            pipeline.width()
        );

        Ok(ServicesHandle {
            alerts,
            cache,
            backfill,
            subscriptions,
            pipeline,
            hyperparams,
            predictor,
            controller,
            trainer,
            engine,
            deduplicator,
            analysis,
            commands,
            training_bootstrap,
        })
    }
}
