use crate::application::alerts::AdminAlerter;
use crate::application::market_data::candle_cache::CandleCache;
use crate::domain::errors::MarketDataError;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ports::MarketDataFeed;
use crate::infrastructure::observability::Metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Consecutive failed fetches (any series) before the operator is alerted
pub const ADMIN_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct FailureState {
    per_key: HashMap<SeriesKey, u32>,
    consecutive: u32,
}

/// Bulk fetches merged into the cache, with failure bookkeeping.
///
/// Keeps a per-series consecutive failure counter (saturating at
/// `max_failures`) that suppresses staleness fallback, and a global
/// consecutive counter that raises an admin alert.
pub struct BackfillService {
    feed: Arc<dyn MarketDataFeed>,
    cache: Arc<CandleCache>,
    alerts: AdminAlerter,
    max_failures: u32,
    state: Mutex<FailureState>,
    metrics: Option<Metrics>,
}

impl BackfillService {
    pub fn new(
        feed: Arc<dyn MarketDataFeed>,
        cache: Arc<CandleCache>,
        alerts: AdminAlerter,
        max_failures: u32,
    ) -> Self {
        Self {
            feed,
            cache,
            alerts,
            max_failures: max_failures.max(1),
            state: Mutex::new(FailureState::default()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FailureState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fetches up to `limit` candles and merges them into the cache.
    /// Returns the series length after the merge.
    pub async fn backfill(&self, key: &SeriesKey, limit: usize) -> Result<usize, MarketDataError> {
        match self.feed.fetch_klines(key, limit).await {
            Ok(candles) => {
                let len = self.cache.merge_backfill(key, &candles);
                self.record_success(key);
                if let Some(m) = &self.metrics {
                    m.inc_candles("backfill", candles.len());
                }
                debug!(
                    "BackfillService [{}]: Merged {} candles (series len {})",
                    key,
                    candles.len(),
                    len
                );
                Ok(len)
            }
            Err(e) => {
                self.record_failure(key, &e).await;
                Err(e)
            }
        }
    }

    /// Backfills and returns the resulting cached series
    pub async fn fetch_recent(
        &self,
        key: &SeriesKey,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.backfill(key, limit).await?;
        Ok(self.cache.snapshot(key))
    }

    /// Staleness fallback entry point; refuses once the series is suppressed
    pub async fn fallback(&self, key: &SeriesKey, limit: usize) -> Result<usize, MarketDataError> {
        let failures = self.failure_count(key);
        if failures >= self.max_failures {
            if let Some(m) = &self.metrics {
                m.inc_fallback("suppressed");
            }
            return Err(MarketDataError::FallbackSuppressed {
                key: key.to_string(),
                failures,
            });
        }

        let result = self.backfill(key, limit).await;
        if let Some(m) = &self.metrics {
            m.inc_fallback(if result.is_ok() { "success" } else { "failure" });
        }
        result
    }

    pub fn is_suppressed(&self, key: &SeriesKey) -> bool {
        self.failure_count(key) >= self.max_failures
    }

    pub fn failure_count(&self, key: &SeriesKey) -> u32 {
        self.lock().per_key.get(key).copied().unwrap_or(0)
    }

    fn record_success(&self, key: &SeriesKey) {
        let mut state = self.lock();
        if state.per_key.remove(key).is_some() {
            info!("BackfillService [{}]: Fetch recovered, fallback re-enabled", key);
        }
        state.consecutive = 0;
    }

    async fn record_failure(&self, key: &SeriesKey, error: &MarketDataError) {
        let (failures, alert_due) = {
            let mut state = self.lock();
            let max = self.max_failures;
            let entry = state.per_key.entry(key.clone()).or_insert(0);
            *entry = (*entry + 1).min(max);
            let failures = *entry;

            state.consecutive += 1;
            let alert_due = state.consecutive >= ADMIN_ALERT_THRESHOLD;
            if alert_due {
                state.consecutive = 0;
            }
            (failures, alert_due)
        };

        warn!(
            "BackfillService [{}]: Fetch failed ({}/{}): {}",
            key, failures, self.max_failures, error
        );

        if matches!(error, MarketDataError::RateLimited) {
            self.alerts
                .alert(&format!(
                    "Warning: Binance rate limit exceeded (HTTP 429) while fetching {}",
                    key
                ))
                .await;
        }

        if alert_due {
            self.alerts
                .alert(&format!(
                    "Warning: Binance API failed {} times in a row (last: {} - {}). Check connectivity or rate limits.",
                    ADMIN_ALERT_THRESHOLD, key, error
                ))
                .await;
        }
    }
}
