use crate::application::market_data::subscription_manager::StreamSubscriptionManager;
use crate::application::ml::Predictor;
use crate::application::signals::analysis_service::AnalysisService;
use crate::application::signals::formatter::{self, StatusReport};
use crate::application::simulation::engine::SimulationEngine;
use crate::application::training::training_controller::TrainingController;
use crate::domain::errors::CommandError;
use crate::domain::market::Timeframe;
use crate::domain::ml::{SharedHyperparams, read_hyperparams};
use crate::domain::ports::MarketDataFeed;
use crate::domain::repositories::{SignalRepository, UserSettingsRepository, WatchConfigRepository};
use crate::domain::watch::WatchConfig;
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

/// Records shown by the history commands
pub const HISTORY_LIMIT: usize = 10;

/// Thin command surface: validates user input and maps each command onto
/// the core services, returning the reply text
pub struct CommandService {
    feed: Arc<dyn MarketDataFeed>,
    analysis: Arc<AnalysisService>,
    subscriptions: StreamSubscriptionManager,
    engine: SimulationEngine,
    controller: Arc<TrainingController>,
    predictor: Arc<dyn Predictor>,
    watches: Arc<dyn WatchConfigRepository>,
    signals: Arc<dyn SignalRepository>,
    settings: Arc<dyn UserSettingsRepository>,
    hyperparams: SharedHyperparams,
}

impl CommandService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<dyn MarketDataFeed>,
        analysis: Arc<AnalysisService>,
        subscriptions: StreamSubscriptionManager,
        engine: SimulationEngine,
        controller: Arc<TrainingController>,
        predictor: Arc<dyn Predictor>,
        watches: Arc<dyn WatchConfigRepository>,
        signals: Arc<dyn SignalRepository>,
        settings: Arc<dyn UserSettingsRepository>,
        hyperparams: SharedHyperparams,
    ) -> Self {
        Self {
            feed,
            analysis,
            subscriptions,
            engine,
            controller,
            predictor,
            watches,
            signals,
            settings,
            hyperparams,
        }
    }

    /// Parses and validates a (symbol, pair, timeframe) request
    async fn resolve(
        &self,
        chat_id: i64,
        symbol: &str,
        pair: &str,
        timeframe: &str,
    ) -> Result<WatchConfig, CommandError> {
        let timeframe: Timeframe = timeframe.parse().map_err(|_| CommandError::InvalidTimeframe {
            input: timeframe.to_string(),
        })?;

        let invalid = || CommandError::InvalidMarket {
            symbol: symbol.to_uppercase(),
            pair: pair.to_uppercase(),
        };
        let well_formed = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !well_formed(symbol.trim()) || !well_formed(pair.trim()) {
            return Err(invalid());
        }

        let valid = self
            .feed
            .is_valid_market(symbol.trim(), pair.trim())
            .await
            .map_err(|e| CommandError::Internal(anyhow::anyhow!(e)))?;
        if !valid {
            return Err(invalid());
        }
        Ok(WatchConfig::new(chat_id, symbol.trim(), pair.trim(), timeframe))
    }

    /// Manual analysis report for one market
    pub async fn analyze(
        &self,
        chat_id: i64,
        symbol: &str,
        pair: &str,
        timeframe: &str,
    ) -> Result<String, CommandError> {
        let config = self.resolve(chat_id, symbol, pair, timeframe).await?;
        let analysis = self.analysis.analyze(&config.series).await?;
        let show_indicators = match self.settings.show_indicators(chat_id).await {
            Ok(show) => show,
            Err(e) => {
                warn!("CommandService: Failed to read settings of chat {}: {:#}", chat_id, e);
                false
            }
        };
        Ok(formatter::format_analysis(&analysis, show_indicators))
    }

    /// Adds a watch, subscribes its live stream and starts its simulation
    pub async fn watch(
        &self,
        chat_id: i64,
        symbol: &str,
        pair: &str,
        timeframe: &str,
    ) -> Result<String, CommandError> {
        let config = self.resolve(chat_id, symbol, pair, timeframe).await?;
        let existing = self
            .watches
            .load_all()
            .await
            .context("Failed to load watch list")?;
        if existing.contains(&config) {
            return Ok(format!("Already watching {}", config.series));
        }

        self.watches
            .upsert(&config)
            .await
            .context("Failed to save watch")?;
        self.subscriptions.subscribe(&config.series);
        self.engine.start(&config);
        info!("CommandService: Chat {} now watching {}", chat_id, config.series);
        Ok(format!("👀 Watching {}", config.series))
    }

    /// Removes a watch, releasing its stream and stopping its simulation
    pub async fn unwatch(
        &self,
        chat_id: i64,
        symbol: &str,
        pair: &str,
        timeframe: &str,
    ) -> Result<String, CommandError> {
        let timeframe: Timeframe = timeframe.parse().map_err(|_| CommandError::InvalidTimeframe {
            input: timeframe.to_string(),
        })?;
        let config = WatchConfig::new(chat_id, symbol.trim(), pair.trim(), timeframe);

        let removed = self
            .watches
            .delete(&config)
            .await
            .context("Failed to delete watch")?;
        if !removed {
            return Ok(format!("Not watching {}", config.series));
        }

        let key = config.key();
        self.subscriptions.unsubscribe(&config.series);
        self.engine.stop(&key);
        self.analysis.deduplicator().forget(&key);
        info!("CommandService: Chat {} stopped watching {}", chat_id, config.series);
        Ok(format!("🛑 Stopped watching {}", config.series))
    }

    pub fn status(&self) -> String {
        formatter::format_status(&StatusReport {
            model_name: self.predictor.name().to_string(),
            training_counter: self.controller.training_counter(),
            accuracy: self.controller.stats(),
            simulation_enabled: self.controller.simulation_enabled(),
            hyperparams: read_hyperparams(&self.hyperparams),
            active_simulations: self.engine.active_count(),
            live_subscriptions: self.subscriptions.active_keys().len(),
        })
    }

    pub async fn signal_history(&self, chat_id: i64) -> Result<String, CommandError> {
        let records = self
            .signals
            .recent(chat_id, HISTORY_LIMIT)
            .await
            .context("Failed to load signal history")?;
        Ok(formatter::format_signal_history(&records))
    }

    pub async fn trade_history(&self, chat_id: i64) -> Result<String, CommandError> {
        let records = self
            .signals
            .recent_trades(chat_id, HISTORY_LIMIT)
            .await
            .context("Failed to load trade history")?;
        Ok(formatter::format_trade_history(&records))
    }

    pub async fn simulation_report(&self, chat_id: i64) -> Result<String, CommandError> {
        let closed = self
            .signals
            .closed_for_chat(chat_id)
            .await
            .context("Failed to load closed trades")?;
        Ok(formatter::format_performance(&closed))
    }

    pub async fn set_show_indicators(&self, chat_id: i64, show: bool) -> Result<String, CommandError> {
        self.settings
            .set_show_indicators(chat_id, show)
            .await
            .context("Failed to save display preference")?;
        Ok(if show {
            "Indicators will be shown in analyses.".to_string()
        } else {
            "Indicators hidden from analyses.".to_string()
        })
    }
}
