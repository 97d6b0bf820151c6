use crate::application::market_data::backfill::BackfillService;
use crate::application::market_data::subscription_manager::StreamSubscriptionManager;
use crate::domain::errors::MarketDataError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome counters of one monitor pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub stale: usize,
    pub refreshed: usize,
    pub suppressed: usize,
    pub failed: usize,
}

/// Watchdog for silent live streams.
///
/// A subscribed series that has not produced a frame for longer than the
/// threshold is refreshed with a bounded bulk fetch.
pub struct StalenessMonitor {
    subscriptions: StreamSubscriptionManager,
    backfill: Arc<BackfillService>,
    check_interval: Duration,
    silence_threshold: Duration,
    fetch_limit: usize,
}

impl StalenessMonitor {
    pub fn new(
        subscriptions: StreamSubscriptionManager,
        backfill: Arc<BackfillService>,
        check_interval: Duration,
        silence_threshold: Duration,
        fetch_limit: usize,
    ) -> Self {
        Self {
            subscriptions,
            backfill,
            check_interval,
            silence_threshold,
            fetch_limit,
        }
    }

    /// One pass over every active subscription
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = Instant::now();

        for key in self.subscriptions.active_keys() {
            report.checked += 1;
            let Some(last) = self.subscriptions.last_message_at(&key) else {
                continue;
            };
            let silence = now.saturating_duration_since(last);
            if silence <= self.silence_threshold {
                continue;
            }

            report.stale += 1;
            debug!(
                "StalenessMonitor [{}]: Silent for {:?}, falling back to REST",
                key, silence
            );
            match self.backfill.fallback(&key, self.fetch_limit).await {
                Ok(len) => {
                    report.refreshed += 1;
                    debug!("StalenessMonitor [{}]: Refreshed (series len {})", key, len);
                }
                Err(MarketDataError::FallbackSuppressed { failures, .. }) => {
                    report.suppressed += 1;
                    debug!(
                        "StalenessMonitor [{}]: Fallback suppressed after {} failures",
                        key, failures
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("StalenessMonitor [{}]: Fallback fetch failed: {}", key, e);
                }
            }
        }
        report
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "StalenessMonitor: Starting (interval {:?}, threshold {:?})",
            self.check_interval, self.silence_threshold
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("StalenessMonitor: Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.check_interval) => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alerts::AdminAlerter;
    use crate::application::market_data::candle_cache::CandleCache;
    use crate::domain::market::{SeriesKey, Timeframe};
    use crate::infrastructure::mock::{MockMarketDataFeed, MockStreamConnector, RecordingNotifier};

    struct Fixture {
        monitor: StalenessMonitor,
        subscriptions: StreamSubscriptionManager,
        feed: Arc<MockMarketDataFeed>,
        cache: Arc<CandleCache>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(CandleCache::new(500));
        let feed = Arc::new(MockMarketDataFeed::new());
        let alerts = AdminAlerter::new(Arc::new(RecordingNotifier::new()), None);
        let backfill = Arc::new(BackfillService::new(feed.clone(), cache.clone(), alerts, 3));
        let subscriptions = StreamSubscriptionManager::new(
            Arc::new(MockStreamConnector::holding()),
            cache.clone(),
            Duration::from_secs(5),
            5,
        );
        let monitor = StalenessMonitor::new(
            subscriptions.clone(),
            backfill,
            Duration::from_secs(5),
            Duration::from_secs(5),
            100,
        );
        Fixture {
            monitor,
            subscriptions,
            feed,
            cache,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("SOL", "USDT", Timeframe::OneHour)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_stream_is_left_alone() {
        let f = fixture();
        f.subscriptions.subscribe(&key());
        let report = f.monitor.tick().await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.stale, 0);
        assert_eq!(f.feed.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_triggers_backfill() {
        let f = fixture();
        f.feed
            .set_series(&key(), MockMarketDataFeed::trending_series(50, 20.0, 0.1));
        f.subscriptions.subscribe(&key());
        tokio::time::sleep(Duration::from_secs(6)).await;

        let report = f.monitor.tick().await;
        assert_eq!(report.stale, 1);
        assert_eq!(report.refreshed, 1);
        assert_eq!(f.cache.len(&key()), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_suppressed_after_three_failures() {
        let f = fixture();
        f.feed.fail_next(100);
        f.subscriptions.subscribe(&key());
        tokio::time::sleep(Duration::from_secs(6)).await;

        for _ in 0..3 {
            assert_eq!(f.monitor.tick().await.failed, 1);
        }
        let report = f.monitor.tick().await;
        assert_eq!(report.suppressed, 1);
        assert_eq!(f.feed.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let f = fixture();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.monitor.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown.cancel();
        assert!(handle.await.is_ok());
    }
}
