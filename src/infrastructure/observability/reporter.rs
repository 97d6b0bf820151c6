//! Push-based metrics reporter
//!
//! Periodically outputs a structured JSON snapshot prefixed with
//! `METRICS_JSON:` so it can be filtered out of the regular log stream.

use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub cached_series: usize,
    pub live_subscriptions: usize,
    pub active_simulations: usize,
    pub simulation_enabled: bool,
    pub training_counter: u64,
    pub rolling_accuracy: Option<f64>,
}

/// Read-only access to the running pipeline
pub trait PipelineProbe: Send + Sync {
    fn probe(&self) -> PipelineSnapshot;
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub pipeline: PipelineSnapshot,
}

pub struct MetricsReporter {
    probe: Arc<dyn PipelineProbe>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(probe: Arc<dyn PipelineProbe>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            probe,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("MetricsReporter: Stopped");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Pipeline: {} series cached | {} live | {} simulating | counter {} | uptime {}s",
                        snapshot.pipeline.cached_series,
                        snapshot.pipeline.live_subscriptions,
                        snapshot.pipeline.active_simulations,
                        snapshot.pipeline.training_counter,
                        snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("MetricsReporter: Failed to serialize metrics: {}", e),
            }
        }
    }

    pub fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let pipeline = self.probe.probe();

        self.metrics.uptime_seconds.set(uptime as f64);
        self.metrics
            .active_subscriptions
            .set(pipeline.live_subscriptions as f64);
        self.metrics
            .active_simulations
            .set(pipeline.active_simulations as f64);

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            pipeline,
        }
    }
}
