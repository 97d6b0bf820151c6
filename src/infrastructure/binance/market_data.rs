//! Binance REST market data
//!
//! Klines for backfill and analysis, and the ticker lookup used to validate
//! a market before it is watched.

use crate::application::alerts::AdminAlerter;
use crate::domain::errors::MarketDataError;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ports::MarketDataFeed;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Request timing and retry policy for the REST feed
#[derive(Debug, Clone)]
pub struct BinanceFeedSettings {
    pub base_url: String,
    pub fetch_timeout: Duration,
    pub retries: u32,
    /// Delay before retry `n` is `retry_delay * n`
    pub retry_delay: Duration,
    pub validity_timeout: Duration,
}

impl Default for BinanceFeedSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            fetch_timeout: Duration::from_secs(10),
            retries: 3,
            retry_delay: Duration::from_millis(5000),
            validity_timeout: Duration::from_secs(5),
        }
    }
}

pub struct BinanceMarketDataFeed {
    client: ClientWithMiddleware,
    settings: BinanceFeedSettings,
    alerts: Option<AdminAlerter>,
    metrics: Option<Metrics>,
}

impl BinanceMarketDataFeed {
    pub fn new(settings: BinanceFeedSettings) -> Self {
        // the feed runs its own linear retry loop
        let client = HttpClientFactory::create_client(settings.fetch_timeout, 0);
        Self {
            client,
            settings,
            alerts: None,
            metrics: None,
        }
    }

    pub fn with_alerts(mut self, alerts: AdminAlerter) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn alert(&self, text: &str) {
        if let Some(alerts) = &self.alerts {
            alerts.alert(text).await;
        }
    }

    async fn fetch_once(&self, key: &SeriesKey, limit: usize) -> Result<Vec<Candle>, MarketDataError> {
        let url = build_url_with_query(
            &format!("{}/api/v3/klines", self.settings.base_url.trim_end_matches('/')),
            &[
                ("symbol", key.market_symbol()),
                ("interval", key.timeframe.to_binance_string().to_string()),
                ("limit", limit.to_string()),
            ],
        );

        let started = Instant::now();
        let timeout = self.settings.fetch_timeout;
        let response = tokio::time::timeout(timeout, self.client.get(&url).send())
            .await
            .map_err(|_| MarketDataError::Timeout {
                duration_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| MarketDataError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(MarketDataError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Transient {
                reason: format!("HTTP {}: {}", status, body),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            MarketDataError::InvalidPayload {
                reason: e.to_string(),
            }
        })?;
        if let Some(m) = &self.metrics {
            m.observe_api_latency("klines", started.elapsed().as_secs_f64());
        }

        validate_batch(parse_klines(&body, chrono::Utc::now().timestamp_millis()), limit)
    }
}

/// Parses the Binance kline array format:
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
///
/// Rows whose close time is after `now_ms` are still forming and are skipped,
/// so only closed candles ever reach the cache.
pub fn parse_klines(body: &serde_json::Value, now_ms: i64) -> Vec<Candle> {
    let Some(rows) = body.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let arr = row.as_array()?;
            if arr.len() < 6 {
                return None;
            }
            if let Some(close_time) = arr.get(6).and_then(|v| v.as_i64())
                && close_time > now_ms
            {
                return None;
            }
            let number = |v: &serde_json::Value| -> Option<f64> {
                match v {
                    serde_json::Value::String(s) => s.parse::<f64>().ok(),
                    other => other.as_f64(),
                }
            };
            Some(Candle::new(
                arr[0].as_i64()?,
                number(&arr[1])?,
                number(&arr[2])?,
                number(&arr[3])?,
                number(&arr[4])?,
                number(&arr[5])?,
            ))
        })
        .collect()
}

/// Drops invalid candles; fails when fewer than half of `limit` survive
pub fn validate_batch(candles: Vec<Candle>, limit: usize) -> Result<Vec<Candle>, MarketDataError> {
    let total = candles.len();
    let valid: Vec<Candle> = candles.into_iter().filter(Candle::is_valid).collect();
    if valid.len() < limit / 2 {
        return Err(MarketDataError::InvalidPayload {
            reason: format!(
                "only {} valid candles of {} received (limit {})",
                valid.len(),
                total,
                limit
            ),
        });
    }
    if valid.len() < total {
        debug!("BinanceMarketDataFeed: Dropped {} invalid candles", total - valid.len());
    }
    Ok(valid)
}

#[async_trait]
impl MarketDataFeed for BinanceMarketDataFeed {
    async fn fetch_klines(&self, key: &SeriesKey, limit: usize) -> Result<Vec<Candle>, MarketDataError> {
        let attempts = self.settings.retries.max(1);
        let mut last_error = MarketDataError::Transient {
            reason: "no attempt made".to_string(),
        };

        for attempt in 1..=attempts {
            match self.fetch_once(key, limit).await {
                Ok(candles) => {
                    if attempt > 1 {
                        info!(
                            "BinanceMarketDataFeed [{}]: Fetch succeeded on attempt {}",
                            key, attempt
                        );
                    }
                    return Ok(candles);
                }
                Err(e) => {
                    warn!(
                        "BinanceMarketDataFeed [{}]: Attempt {}/{} failed: {}",
                        key, attempt, attempts, e
                    );
                    if e == MarketDataError::RateLimited {
                        self.alert(&format!("⚠️ Binance rate limit hit while fetching {}", key))
                            .await;
                    }
                    let retryable = e.is_retryable();
                    last_error = e;
                    if !retryable {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay * attempt).await;
                    }
                }
            }
        }

        self.alert(&format!(
            "❌ Failed to fetch {} candles after {} attempts: {}",
            key, attempts, last_error
        ))
        .await;
        Err(MarketDataError::RetriesExhausted {
            attempts,
            reason: last_error.to_string(),
        })
    }

    async fn is_valid_market(&self, symbol: &str, pair: &str) -> Result<bool, MarketDataError> {
        let market = format!("{}{}", symbol.trim(), pair.trim()).to_uppercase();
        let url = build_url_with_query(
            &format!("{}/api/v3/ticker/price", self.settings.base_url.trim_end_matches('/')),
            &[("symbol", market.as_str())],
        );

        let timeout = self.settings.validity_timeout;
        let response = tokio::time::timeout(timeout, self.client.get(&url).send())
            .await
            .map_err(|_| MarketDataError::Timeout {
                duration_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| MarketDataError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            debug!("BinanceMarketDataFeed: {} is not a listed market", market);
            return Ok(false);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited);
        }
        Err(MarketDataError::Transient {
            reason: format!("HTTP {} validating {}", status, market),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_klines() {
        let body = json!([
            [1704067200000i64, "42000.1", "42100.0", "41900.0", "42050.5", "12.5", 1704070799999i64, "0", 10, "0", "0", "0"],
            [1704070800000i64, "42050.5", "42200.0", "42000.0", "42150.0", "8.0", 1704074399999i64, "0", 7, "0", "0", "0"],
            ["bad"],
        ]);
        let candles = parse_klines(&body, 1_704_074_400_000);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_704_067_200_000);
        assert_eq!(candles[1].close, 42_150.0);
        assert!(parse_klines(&json!({"code": -1121}), 0).is_empty());
    }

    #[test]
    fn test_forming_kline_is_skipped_so_stream_can_close_it() {
        use crate::application::market_data::candle_cache::CandleCache;
        use crate::domain::market::Timeframe;

        let now = 100_000;
        let body = json!([
            [0i64, "1.0", "1.1", "0.9", "1.0", "5.0", 59_999i64],
            [60_000i64, "1.0", "1.05", "0.95", "1.01", "2.0", 119_999i64],
        ]);
        let candles = parse_klines(&body, now);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 0);

        let key = SeriesKey::new("BTC", "USDT", Timeframe::OneMin);
        let cache = CandleCache::new(10);
        cache.merge_backfill(&key, &candles);

        // the stream's closed version of the same minute is accepted
        let closed = Candle::new(60_000, 1.0, 1.3, 0.95, 1.25, 9.0);
        assert!(cache.append_live(&key, closed));
        assert_eq!(cache.snapshot(&key)[1].close, 1.25);
    }

    #[test]
    fn test_validate_batch_drops_invalid() {
        let good = Candle::new(1, 1.0, 1.2, 0.9, 1.1, 10.0);
        let inverted = Candle::new(2, 1.0, 0.8, 0.9, 1.1, 10.0);
        let zero = Candle::new(3, 0.0, 1.2, 0.9, 1.1, 10.0);

        let kept = validate_batch(vec![good, inverted, good], 4).unwrap();
        assert_eq!(kept.len(), 2);

        assert!(matches!(
            validate_batch(vec![good, inverted, zero], 4),
            Err(MarketDataError::InvalidPayload { .. })
        ));
    }
}
