//! Prometheus metrics definitions for candlecast
//!
//! All metrics use the `candlecast_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the ingestion, training and signal pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Candles written to the cache, by source (live/backfill)
    pub candles_ingested_total: CounterVec,
    /// Live stream reconnect attempts
    pub stream_reconnects_total: Counter,
    /// Staleness fallback fetches, by outcome
    pub fallback_fetches_total: CounterVec,
    /// Simulation steps, by outcome
    pub simulation_steps_total: CounterVec,
    /// Predictor fit calls
    pub training_fits_total: Counter,
    /// Mean of the rolling accuracy window (0-1)
    pub rolling_accuracy: GenericGauge<AtomicF64>,
    /// Signals accepted by the deduplicator, by type
    pub signals_emitted_total: CounterVec,
    /// Notifications that failed to send
    pub notifications_failed_total: Counter,
    /// Series with a live subscription
    pub active_subscriptions: GenericGauge<AtomicF64>,
    /// Configs with an active simulation loop
    pub active_simulations: GenericGauge<AtomicF64>,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
    /// REST latency in seconds
    pub api_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let candles_ingested_total = CounterVec::new(
            Opts::new(
                "candlecast_candles_ingested_total",
                "Candles written to the cache by source",
            ),
            &["source"],
        )?;
        registry.register(Box::new(candles_ingested_total.clone()))?;

        let stream_reconnects_total = Counter::with_opts(Opts::new(
            "candlecast_stream_reconnects_total",
            "Total live stream reconnection attempts",
        ))?;
        registry.register(Box::new(stream_reconnects_total.clone()))?;

        let fallback_fetches_total = CounterVec::new(
            Opts::new(
                "candlecast_fallback_fetches_total",
                "Staleness fallback fetches by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(fallback_fetches_total.clone()))?;

        let simulation_steps_total = CounterVec::new(
            Opts::new(
                "candlecast_simulation_steps_total",
                "Simulation steps by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(simulation_steps_total.clone()))?;

        let training_fits_total = Counter::with_opts(Opts::new(
            "candlecast_training_fits_total",
            "Predictor fit calls",
        ))?;
        registry.register(Box::new(training_fits_total.clone()))?;

        let rolling_accuracy = Gauge::with_opts(Opts::new(
            "candlecast_rolling_accuracy",
            "Mean rolling prediction accuracy (0-1)",
        ))?;
        registry.register(Box::new(rolling_accuracy.clone()))?;

        let signals_emitted_total = CounterVec::new(
            Opts::new(
                "candlecast_signals_emitted_total",
                "Signals accepted for notification by type",
            ),
            &["signal_type"],
        )?;
        registry.register(Box::new(signals_emitted_total.clone()))?;

        let notifications_failed_total = Counter::with_opts(Opts::new(
            "candlecast_notifications_failed_total",
            "Notifications that failed to send",
        ))?;
        registry.register(Box::new(notifications_failed_total.clone()))?;

        let active_subscriptions = Gauge::with_opts(Opts::new(
            "candlecast_active_subscriptions",
            "Series with a live stream subscription",
        ))?;
        registry.register(Box::new(active_subscriptions.clone()))?;

        let active_simulations = Gauge::with_opts(Opts::new(
            "candlecast_active_simulations",
            "Watch configs with an active simulation loop",
        ))?;
        registry.register(Box::new(active_simulations.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "candlecast_uptime_seconds",
            "Server uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let api_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "candlecast_api_latency_seconds",
                "REST request latency in seconds",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(api_latency_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            candles_ingested_total,
            stream_reconnects_total,
            fallback_fetches_total,
            simulation_steps_total,
            training_fits_total,
            rolling_accuracy,
            signals_emitted_total,
            notifications_failed_total,
            active_subscriptions,
            active_simulations,
            uptime_seconds,
            api_latency_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_candles(&self, source: &str, count: usize) {
        self.candles_ingested_total
            .with_label_values(&[source])
            .inc_by(count as f64);
    }

    pub fn inc_fallback(&self, outcome: &str) {
        self.fallback_fetches_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_simulation_step(&self, outcome: &str) {
        self.simulation_steps_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_signals(&self, signal_type: &str) {
        self.signals_emitted_total
            .with_label_values(&[signal_type])
            .inc();
    }

    pub fn observe_api_latency(&self, endpoint: &str, latency: f64) {
        self.api_latency_seconds
            .with_label_values(&[endpoint])
            .observe(latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        assert!(metrics.render().contains("candlecast_"));
    }

    #[test]
    fn test_rolling_accuracy_gauge() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.rolling_accuracy.set(0.5);
        assert!(metrics.render().contains("candlecast_rolling_accuracy 0.5"));
    }

    #[test]
    fn test_labelled_counters() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_candles("live", 3);
        metrics.inc_fallback("success");
        metrics.inc_signals("LONG");
        let output = metrics.render();
        assert!(output.contains("candlecast_candles_ingested_total{source=\"live\"} 3"));
        assert!(output.contains("candlecast_fallback_fetches_total"));
        assert!(output.contains("LONG"));
    }
}
