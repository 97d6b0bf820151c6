use crate::domain::errors::MarketDataError;
use crate::domain::market::{Candle, SeriesKey};
use crate::domain::ports::{KlineStreamConnector, MarketDataFeed, NotificationChannel, StreamEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::Sender;
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory market feed serving scripted series
#[derive(Default)]
pub struct MockMarketDataFeed {
    series: Mutex<HashMap<SeriesKey, Vec<Candle>>>,
    invalid_markets: Mutex<HashSet<String>>,
    failures_remaining: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockMarketDataFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_series(&self, key: &SeriesKey, candles: Vec<Candle>) {
        lock(&self.series).insert(key.clone(), candles);
    }

    /// Appends one candle to a scripted series
    pub fn push_candle(&self, key: &SeriesKey, candle: Candle) {
        lock(&self.series).entry(key.clone()).or_default().push(candle);
    }

    /// The next `count` fetches fail with a transient error
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn mark_invalid_market(&self, symbol: &str, pair: &str) {
        lock(&self.invalid_markets).insert(format!("{}{}", symbol, pair).to_uppercase());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Hourly candles with a linear close drift and a small wick.
    ///
    /// Timestamps start at 2024-01-01T00:00:00Z.
    pub fn trending_series(count: usize, start: f64, step: f64) -> Vec<Candle> {
        const START_MS: i64 = 1_704_067_200_000;
        const HOUR_MS: i64 = 3_600_000;
        (0..count)
            .map(|i| {
                let close = (start + step * i as f64).max(0.01);
                let open = (close - step).max(0.01);
                let high = open.max(close) * 1.002;
                let low = open.min(close) * 0.998;
                let volume = 1_000.0 + (i % 7) as f64 * 150.0;
                Candle::new(START_MS + i as i64 * HOUR_MS, open, high, low, close, volume)
            })
            .collect()
    }

    /// Hourly candles oscillating around `center` with the given amplitude
    pub fn oscillating_series(count: usize, center: f64, amplitude: f64) -> Vec<Candle> {
        const START_MS: i64 = 1_704_067_200_000;
        const HOUR_MS: i64 = 3_600_000;
        (0..count)
            .map(|i| {
                let phase = i as f64 / 6.0;
                let close = center + amplitude * phase.sin();
                let open = center + amplitude * (phase - 1.0 / 6.0).sin();
                let high = open.max(close) + amplitude * 0.1;
                let low = open.min(close) - amplitude * 0.1;
                let volume = 800.0 + (i % 5) as f64 * 300.0;
                Candle::new(START_MS + i as i64 * HOUR_MS, open, high, low, close, volume)
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataFeed for MockMarketDataFeed {
    async fn fetch_klines(
        &self,
        key: &SeriesKey,
        limit: usize,
    ) -> std::result::Result<Vec<Candle>, MarketDataError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(MarketDataError::RetriesExhausted {
                attempts: 3,
                reason: "mock failure".to_string(),
            });
        }

        let series = lock(&self.series).get(key).cloned().unwrap_or_default();
        if series.is_empty() {
            return Err(MarketDataError::InvalidPayload {
                reason: format!("no mock data for {}", key),
            });
        }
        let skip = series.len().saturating_sub(limit);
        Ok(series[skip..].to_vec())
    }

    async fn is_valid_market(
        &self,
        symbol: &str,
        pair: &str,
    ) -> std::result::Result<bool, MarketDataError> {
        let market = format!("{}{}", symbol, pair).to_uppercase();
        Ok(!lock(&self.invalid_markets).contains(&market))
    }
}

/// Scripted behaviour of one mock stream connection attempt
#[derive(Debug, Clone)]
pub enum MockConnection {
    /// Fails before opening
    Refused,
    /// Opens, delivers the messages, then closes cleanly
    Session(Vec<String>),
    /// Opens, delivers the messages, then stays open until dropped
    Hold(Vec<String>),
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Stream connector replaying scripted connection attempts.
///
/// When the script is exhausted every further attempt uses `fallback`.
pub struct MockStreamConnector {
    script: Mutex<VecDeque<MockConnection>>,
    fallback: MockConnection,
    connects: AtomicUsize,
    open: Arc<AtomicUsize>,
}

impl MockStreamConnector {
    pub fn new(fallback: MockConnection) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            connects: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connections that open and stay open
    pub fn holding() -> Self {
        Self::new(MockConnection::Hold(Vec::new()))
    }

    /// Connections that are always refused
    pub fn refusing() -> Self {
        Self::new(MockConnection::Refused)
    }

    pub fn push(&self, connection: MockConnection) {
        lock(&self.script).push_back(connection);
    }

    /// Total connection attempts so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections currently held open
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KlineStreamConnector for MockStreamConnector {
    async fn run(
        &self,
        key: &SeriesKey,
        events: Sender<StreamEvent>,
    ) -> std::result::Result<(), MarketDataError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let connection = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        debug!("MockStreamConnector [{}]: {:?}", key, connection);

        let (messages, hold) = match connection {
            MockConnection::Refused => {
                return Err(MarketDataError::Transient {
                    reason: "connection refused".to_string(),
                });
            }
            MockConnection::Session(messages) => (messages, false),
            MockConnection::Hold(messages) => (messages, true),
        };

        self.open.fetch_add(1, Ordering::SeqCst);
        let _guard = OpenGuard(self.open.clone());

        let _ = events.send(StreamEvent::Opened).await;
        for message in messages {
            if events.send(StreamEvent::Message(message)).await.is_err() {
                return Ok(());
            }
        }
        if hold {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Notification channel that records every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(i64, String)> {
        lock(&self.messages).clone()
    }

    pub fn messages_for(&self, destination: i64) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|(d, _)| *d == destination)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn send(&self, destination: i64, text: &str) -> Result<()> {
        lock(&self.messages).push((destination, text.to_string()));
        Ok(())
    }
}

/// Builds a Binance kline stream payload for tests
pub fn kline_message(market_symbol: &str, interval: &str, candle: &Candle, closed: bool) -> String {
    serde_json::json!({
        "e": "kline",
        "E": candle.timestamp + 1,
        "s": market_symbol,
        "k": {
            "t": candle.timestamp,
            "s": market_symbol,
            "i": interval,
            "o": candle.open.to_string(),
            "h": candle.high.to_string(),
            "l": candle.low.to_string(),
            "c": candle.close.to_string(),
            "v": candle.volume.to_string(),
            "x": closed
        }
    })
    .to_string()
}
