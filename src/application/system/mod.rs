use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod scheduler;

use crate::application::alerts::AdminAlerter;
use crate::application::bootstrap::{
    persistence::{PersistenceBootstrap, PersistenceHandle},
    services::{Ports, ServicesBootstrap, ServicesHandle},
};
use crate::application::commands::CommandService;
use crate::application::signals::formatter;
use crate::application::training::training_controller::ControlDecision;
use crate::config::Config;
use crate::domain::ports::NotificationChannel;
use crate::infrastructure::binance::{BinanceFeedSettings, BinanceKlineConnector, BinanceMarketDataFeed};
use crate::infrastructure::notifier::{LogNotifier, TelegramNotifier};
use crate::infrastructure::observability::{
    Metrics, MetricsReporter, PipelineProbe, PipelineSnapshot,
};
use scheduler::spawn_periodic;

/// Pending signals re-evaluated per resolution pass
const RESOLVE_BATCH: usize = 50;

pub struct SystemHandle {
    pub commands: Arc<CommandService>,
    pub services: ServicesHandle,
    pub metrics: Metrics,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SystemHandle {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels every scheduled job, simulation loop and live stream, then
    /// waits for the jobs to return
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        self.shutdown.cancel();
        self.services.engine.shutdown();
        self.services.subscriptions.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Scheduled task ended abnormally: {}", e);
            }
        }
        info!("Shutdown complete.");
    }
}

/// Read-only view over the running services for the metrics reporter
struct SystemProbe {
    services: ServicesHandle,
}

impl PipelineProbe for SystemProbe {
    fn probe(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            cached_series: self.services.cache.keys().len(),
            live_subscriptions: self.services.subscriptions.active_keys().len(),
            active_simulations: self.services.engine.active_count(),
            simulation_enabled: self.services.controller.simulation_enabled(),
            training_counter: self.services.controller.training_counter(),
            rolling_accuracy: self.services.controller.mean_accuracy(),
        }
    }
}

pub struct Application {
    pub config: Config,
    pub persistence: PersistenceHandle,
    pub services: ServicesHandle,
    pub metrics: Metrics,
}

impl Application {
    /// Wires the production adapters: Binance REST/WebSocket, Telegram (or
    /// log-only) notifications and SQLite persistence
    pub async fn build(config: Config) -> Result<Self> {
        info!("Building candlecast application...");
        let metrics = Metrics::new().context("Failed to create metrics registry")?;
        let persistence = PersistenceBootstrap::init(&config.database_url).await?;

        let notifier: Arc<dyn NotificationChannel> = match &config.notifier.bot_token {
            Some(token) => Arc::new(
                TelegramNotifier::new(&config.notifier.api_url, token).with_metrics(metrics.clone()),
            ),
            None => {
                warn!("TELEGRAM_BOT_TOKEN not set, notifications will only be logged");
                Arc::new(LogNotifier::new())
            }
        };
        let alerts = AdminAlerter::new(notifier.clone(), config.notifier.admin_chat_id);

        let feed = BinanceMarketDataFeed::new(BinanceFeedSettings {
            base_url: config.market.base_url.clone(),
            fetch_timeout: config.market.fetch_timeout(),
            retries: config.market.retries,
            retry_delay: config.market.retry_delay(),
            validity_timeout: config.market.validity_timeout(),
        })
        .with_alerts(alerts)
        .with_metrics(metrics.clone());

        let ports = Ports {
            feed: Arc::new(feed),
            connector: Arc::new(BinanceKlineConnector::new(config.market.ws_url.clone())),
            notifier,
        };
        Self::assemble(config, ports, persistence, metrics)
    }

    /// Wires the core against arbitrary ports and repositories
    pub fn assemble(
        config: Config,
        ports: Ports,
        persistence: PersistenceHandle,
        metrics: Metrics,
    ) -> Result<Self> {
        let services = ServicesBootstrap::init(&config, ports, &persistence, &metrics)?;
        Ok(Self {
            config,
            persistence,
            services,
            metrics,
        })
    }

    pub async fn start(self) -> Result<SystemHandle> {
        let Application {
            config,
            persistence,
            services,
            metrics,
        } = self;
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        // Live streams for every persisted watch
        let watches = match persistence.watch_repository.load_all().await {
            Ok(watches) => watches,
            Err(e) => {
                error!("Failed to load watch configs: {:#}", e);
                Vec::new()
            }
        };
        for watch in &watches {
            services.subscriptions.subscribe(&watch.series);
        }
        info!("Restored {} watch config(s)", watches.len());

        // Bootstrap training, then resume simulations
        {
            let services = services.clone();
            let pairs = config.model.bootstrap_pairs.clone();
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    reports = services.training_bootstrap.run(&pairs) => {
                        info!("Bootstrap training finished ({} series trained)", reports.len());
                        if let Err(e) = services.engine.start_all().await {
                            error!("Failed to start simulations: {:#}", e);
                        }
                    }
                }
            }));
        }

        tasks.push(tokio::spawn(
            services.staleness_monitor(&config).run(shutdown.clone()),
        ));

        // Auto-check of every watched config
        {
            let services = services.clone();
            let watches = persistence.watch_repository.clone();
            tasks.push(spawn_periodic(
                "auto-check",
                config.signal.auto_check_interval(),
                shutdown.clone(),
                move || {
                    let services = services.clone();
                    let watches = watches.clone();
                    async move {
                        let configs = match watches.load_all().await {
                            Ok(configs) => configs,
                            Err(e) => {
                                error!("Auto-check: Failed to load watch configs: {:#}", e);
                                return;
                            }
                        };
                        for config in configs {
                            let now_ms = chrono::Utc::now().timestamp_millis();
                            if let Err(e) = services.analysis.check_watch(&config, now_ms).await {
                                warn!("Auto-check [{}]: {:#}", config.key(), e);
                            }
                        }
                    }
                },
            ));
        }

        // Training stability control
        {
            let services = services.clone();
            tasks.push(spawn_periodic(
                "training-controller",
                config.simulation.controller_interval(),
                shutdown.clone(),
                move || {
                    let services = services.clone();
                    async move {
                        if let ControlDecision::Unstable { .. } = services.controller.evaluate().await
                            && let Err(e) = services.engine.start_all().await
                        {
                            error!("Training controller: Failed to re-arm simulations: {:#}", e);
                        }
                    }
                },
            ));
        }

        // Signal buffer cleanup
        {
            let deduplicator = services.deduplicator.clone();
            let ttl_ms = config.signal.buffer_ttl_ms();
            tasks.push(spawn_periodic(
                "signal-buffer-cleanup",
                config.signal.buffer_cleanup_interval(),
                shutdown.clone(),
                move || {
                    let deduplicator = deduplicator.clone();
                    async move {
                        let now_ms = chrono::Utc::now().timestamp_millis();
                        let purged = deduplicator.purge_expired(now_ms, ttl_ms);
                        if purged > 0 {
                            info!("Signal buffer: Purged {} expired entries", purged);
                        }
                    }
                },
            ));
        }

        // Pending outcome resolution
        {
            let analysis = services.analysis.clone();
            tasks.push(spawn_periodic(
                "outcome-resolution",
                config.signal.outcome_resolve_interval(),
                shutdown.clone(),
                move || {
                    let analysis = analysis.clone();
                    async move {
                        if let Err(e) = analysis.resolve_pending(RESOLVE_BATCH).await {
                            warn!("Outcome resolution failed: {:#}", e);
                        }
                    }
                },
            ));
        }

        // Admin reports
        {
            let services = services.clone();
            tasks.push(spawn_periodic(
                "model-report",
                std::time::Duration::from_secs(config.observability.model_report_interval_secs),
                shutdown.clone(),
                move || {
                    let services = services.clone();
                    async move {
                        if let Some(stats) = services.controller.stats() {
                            let report = formatter::format_model_report(
                                &stats,
                                services.controller.training_counter(),
                            );
                            services.alerts.alert(&report).await;
                        }
                    }
                },
            ));
        }
        {
            let services = services.clone();
            tasks.push(spawn_periodic(
                "simulation-report",
                std::time::Duration::from_secs(config.observability.sim_report_interval_secs),
                shutdown.clone(),
                move || {
                    let services = services.clone();
                    async move {
                        let stats = services.engine.all_stats();
                        if !stats.is_empty() {
                            let report = formatter::format_simulation_report(&stats);
                            services.alerts.alert(&report).await;
                        }
                    }
                },
            ));
        }

        if config.observability.enabled {
            let probe = Arc::new(SystemProbe {
                services: services.clone(),
            });
            let reporter = MetricsReporter::new(probe, metrics.clone(), config.observability.interval);
            tasks.push(tokio::spawn(reporter.run(shutdown.clone())));
        } else {
            info!("Metrics reporting disabled.");
        }

        info!("candlecast running with {} scheduled task(s)", tasks.len());
        Ok(SystemHandle {
            commands: services.commands.clone(),
            services,
            metrics,
            shutdown,
            tasks,
        })
    }
}
